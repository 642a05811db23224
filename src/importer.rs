//! Importers materialize external staging datasets before planning.
//!
//! An external dataset names rows that are not in the warehouse yet. The
//! ingestor creates its staging table, then an [`Importer`] loads the rows,
//! filling in the digest column when the ingest mode needs one the source
//! does not provide.

use std::path::PathBuf;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::dataset::{Dataset, DatasetKind, ExternalSource};
use crate::executor::{Executor, ExecutorError, Placeholders};
use crate::logical_plan::LogicalPlan;
use crate::sql::dml::Insert;
use crate::sql::expr::{lit_bool, lit_float, lit_int, lit_null, lit_str, lit_timestamp, Expr};
use crate::sql::types::{DataType, TypeFamily};
use crate::transformer::RelationalTransformer;

/// Rows per INSERT statement.
const IMPORT_CHUNK_ROWS: usize = 500;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON rows: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dataset '{0}' is not external")]
    NotExternal(String),

    #[error(transparent)]
    Execution(#[from] ExecutorError),
}

pub type ImportResult<T> = Result<T, ImportError>;

/// Whether and how to compute the digest column while importing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestInfo {
    pub populate_digest: bool,
    pub digest_field: Option<String>,
    /// Columns left out of the digest.
    pub meta_fields: Vec<String>,
}

impl DigestInfo {
    fn target(&self) -> Option<&str> {
        self.digest_field.as_deref().filter(|_| self.populate_digest)
    }

    fn excludes(&self, field: &str) -> bool {
        self.digest_field
            .as_deref()
            .is_some_and(|d| d.eq_ignore_ascii_case(field))
            || self.meta_fields.iter().any(|m| m.eq_ignore_ascii_case(field))
    }
}

pub trait Importer {
    /// Load the rows of external `dataset` into its (already created) table.
    fn import_data(
        &self,
        executor: &mut dyn Executor,
        dataset: &Dataset,
        digest: &DigestInfo,
    ) -> ImportResult<usize>;
}

/// Imports JSON objects, from memory or from a file holding a JSON array.
#[derive(Debug, Clone, Copy)]
pub struct JsonRowsImporter {
    transformer: RelationalTransformer,
}

impl JsonRowsImporter {
    pub fn new(transformer: RelationalTransformer) -> Self {
        Self { transformer }
    }
}

impl Importer for JsonRowsImporter {
    fn import_data(
        &self,
        executor: &mut dyn Executor,
        dataset: &Dataset,
        digest: &DigestInfo,
    ) -> ImportResult<usize> {
        let DatasetKind::External { source } = &dataset.kind else {
            return Err(ImportError::NotExternal(dataset.name().to_string()));
        };
        let rows = load_rows(source)?;
        let fields = &dataset.schema.fields;

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            let digest_value = digest.target().map(|_| compute_digest(dataset, row, digest)).transpose()?;
            values.push(
                fields
                    .iter()
                    .map(|field| match (&digest_value, digest.target()) {
                        (Some(value), Some(target)) if target.eq_ignore_ascii_case(&field.name) => {
                            lit_str(value)
                        }
                        _ => to_literal(lookup(row, &field.name), &field.data_type),
                    })
                    .collect::<Vec<Expr>>(),
            );
        }

        for chunk in values.chunks(IMPORT_CHUNK_ROWS) {
            let insert = Insert::into(dataset.name())
                .schema(dataset.group())
                .columns(fields.iter().map(|f| f.name.clone()))
                .values_many(chunk.to_vec());
            let plan = self.transformer.generate_physical_plan(&LogicalPlan::of(insert));
            executor.execute_physical_plan(&plan, &Placeholders::new())?;
        }
        info!(dataset = dataset.name(), rows = rows.len(), "imported external rows");
        Ok(rows.len())
    }
}

fn load_rows(source: &ExternalSource) -> ImportResult<Vec<Map<String, Value>>> {
    match source {
        ExternalSource::Rows(rows) => Ok(rows.clone()),
        ExternalSource::File(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
                path: path.clone(),
                source,
            })?;
            Ok(serde_json::from_str(&text)?)
        }
    }
}

/// Case-insensitive column lookup; absent keys read as NULL.
fn lookup<'a>(row: &'a Map<String, Value>, name: &str) -> &'a Value {
    row.get(name)
        .or_else(|| {
            row.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
        .unwrap_or(&Value::Null)
}

/// SHA-256 over the row's data columns in schema order, as lowercase hex.
fn compute_digest(
    dataset: &Dataset,
    row: &Map<String, Value>,
    digest: &DigestInfo,
) -> Result<String, serde_json::Error> {
    let values: Vec<(&str, &Value)> = dataset
        .schema
        .fields
        .iter()
        .filter(|f| !digest.excludes(&f.name))
        .map(|f| (f.name.as_str(), lookup(row, &f.name)))
        .collect();
    let json = serde_json::to_string(&values)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn to_literal(value: &Value, data_type: &DataType) -> Expr {
    match value {
        Value::Null => lit_null(),
        Value::Bool(b) => lit_bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) if data_type.family() != TypeFamily::Float => lit_int(i),
            _ => n.as_f64().map(lit_float).unwrap_or_else(lit_null),
        },
        Value::String(s) if matches!(data_type, DataType::Timestamp | DataType::TimestampTz) => {
            lit_timestamp(s)
        }
        Value::String(s) => lit_str(s),
        other => lit_str(&other.to_string()),
    }
}
