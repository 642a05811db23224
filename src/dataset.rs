//! Dataset model: the staging, main and batch-metadata tables an ingest
//! reads and writes.
//!
//! A [`Dataset`] pairs a [`DatasetReference`] with an ordered
//! [`SchemaDefinition`]. Staging can be a plain definition, a filtered
//! derivation, or an external reference imported before planning.
//! [`Datasets`] bundles the tables of one ingest and is never mutated;
//! schema evolution produces a new copy through [`Datasets::with_main_dataset`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::sql::expr::{lit_bool, lit_float, lit_int, lit_str, table_col, Expr, ExprExt};
use crate::sql::types::DataType;

// =============================================================================
// Fields and Schemas
// =============================================================================

/// One column of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            primary_key: false,
            nullable: true,
        }
    }

    /// Mark as primary key; key columns are never nullable.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered list of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub fields: Vec<Field>,
}

impl SchemaDefinition {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Case-insensitive lookup, matching how warehouses resolve unquoted names.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn primary_keys(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

// =============================================================================
// Filters
// =============================================================================

/// A literal value used by staging filters and delete indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn to_expr(&self) -> Expr {
        match self {
            FieldValue::Bool(b) => lit_bool(*b),
            FieldValue::Int(n) => lit_int(*n),
            FieldValue::Float(f) => lit_float(*f),
            FieldValue::Text(s) => lit_str(s),
        }
    }
}

/// Comparison used by a [`DatasetFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Row filter applied wherever a derived staging dataset is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl DatasetFilter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: FieldValue) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Render against the table alias `alias`.
    pub fn to_expr(&self, alias: &str) -> Expr {
        let column = table_col(alias, &self.field);
        let value = self.value.to_expr();
        match self.op {
            FilterOp::Eq => column.eq(value),
            FilterOp::Ne => column.ne(value),
            FilterOp::Gt => column.gt(value),
            FilterOp::Gte => column.gte(value),
            FilterOp::Lt => column.lt(value),
            FilterOp::Lte => column.lte(value),
        }
    }
}

// =============================================================================
// Datasets
// =============================================================================

/// Where a dataset lives: optional group (schema) and table name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetReference {
    #[serde(default)]
    pub group: Option<String>,
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl DatasetReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            group: None,
            name: name.into(),
            alias: None,
        }
    }
}

/// Rows an external dataset is materialized from.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalSource {
    /// A JSON file holding an array of objects.
    File(PathBuf),
    /// Rows already in memory.
    Rows(Vec<serde_json::Map<String, serde_json::Value>>),
}

/// The three kinds of dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetKind {
    /// Schema fully known, table exists (or will be created).
    Definition,
    /// Staging read through row filters.
    Derived { filters: Vec<DatasetFilter> },
    /// Staging not yet materialized; the importer loads it first.
    External { source: ExternalSource },
}

/// A table reference plus its schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub reference: DatasetReference,
    pub schema: SchemaDefinition,
    pub kind: DatasetKind,
}

impl Dataset {
    /// A plain dataset definition.
    pub fn definition(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            reference: DatasetReference::new(name),
            schema: SchemaDefinition::new(fields),
            kind: DatasetKind::Definition,
        }
    }

    /// Staging read through row filters.
    pub fn derived(name: impl Into<String>, fields: Vec<Field>, filters: Vec<DatasetFilter>) -> Self {
        Self {
            kind: DatasetKind::Derived { filters },
            ..Self::definition(name, fields)
        }
    }

    /// Staging imported from an external source.
    pub fn external(name: impl Into<String>, fields: Vec<Field>, source: ExternalSource) -> Self {
        Self {
            kind: DatasetKind::External { source },
            ..Self::definition(name, fields)
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.reference.group = Some(group.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.reference.alias = Some(alias.into());
        self
    }

    pub fn with_schema(mut self, schema: SchemaDefinition) -> Self {
        self.schema = schema;
        self
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    pub fn group(&self) -> Option<String> {
        self.reference.group.clone()
    }

    /// Row filters, empty unless derived.
    pub fn filters(&self) -> &[DatasetFilter] {
        match &self.kind {
            DatasetKind::Derived { filters } => filters,
            DatasetKind::Definition | DatasetKind::External { .. } => &[],
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self.kind, DatasetKind::External { .. })
    }

    /// The same table as a plain definition, once materialized.
    pub fn materialized(&self) -> Self {
        Self {
            kind: DatasetKind::Definition,
            ..self.clone()
        }
    }
}

// =============================================================================
// Batch Metadata
// =============================================================================

/// The batch-audit table: one row per completed batch of each main table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataDataset {
    pub group: Option<String>,
    pub name: String,
    pub table_name_field: String,
    pub batch_start_ts_field: String,
    pub batch_end_ts_field: String,
    pub batch_status_field: String,
    pub table_batch_id_field: String,
}

impl Default for MetadataDataset {
    fn default() -> Self {
        Self {
            group: None,
            name: "batch_metadata".into(),
            table_name_field: "table_name".into(),
            batch_start_ts_field: "batch_start_ts_utc".into(),
            batch_end_ts_field: "batch_end_ts_utc".into(),
            batch_status_field: "batch_status".into(),
            table_batch_id_field: "table_batch_id".into(),
        }
    }
}

impl MetadataDataset {
    pub fn dataset(&self) -> Dataset {
        let mut dataset = Dataset::definition(
            self.name.clone(),
            vec![
                Field::new(self.table_name_field.clone(), DataType::Varchar(255)),
                Field::new(self.batch_start_ts_field.clone(), DataType::Timestamp),
                Field::new(self.batch_end_ts_field.clone(), DataType::Timestamp),
                Field::new(self.batch_status_field.clone(), DataType::Varchar(32)),
                Field::new(self.table_batch_id_field.clone(), DataType::Int32),
            ],
        );
        dataset.reference.group = self.group.clone();
        dataset
    }
}

/// Every table one ingest touches.
#[derive(Debug, Clone, PartialEq)]
pub struct Datasets {
    pub main: Dataset,
    pub staging: Dataset,
    pub metadata: MetadataDataset,
    /// Replacement intervals of a bitemporal delta; defaults to `<main>_temp`.
    pub temp: Option<Dataset>,
    /// Working copy of staging for a bitemporal delta; defaults to `<main>_stage_work`.
    pub stage_work: Option<Dataset>,
}

impl Datasets {
    pub fn new(main: Dataset, staging: Dataset) -> Self {
        Self {
            main,
            staging,
            metadata: MetadataDataset::default(),
            temp: None,
            stage_work: None,
        }
    }

    pub fn with_metadata(self, metadata: MetadataDataset) -> Self {
        Self { metadata, ..self }
    }

    pub fn with_temp(self, temp: Dataset) -> Self {
        Self {
            temp: Some(temp),
            ..self
        }
    }

    pub fn with_stage_work(self, stage_work: Dataset) -> Self {
        Self {
            stage_work: Some(stage_work),
            ..self
        }
    }

    /// A copy with `main` replaced; used after schema evolution.
    pub fn with_main_dataset(&self, main: Dataset) -> Self {
        Self {
            main,
            ..self.clone()
        }
    }

    /// A copy with `staging` replaced; used once an external dataset is imported.
    pub fn with_staging_dataset(&self, staging: Dataset) -> Self {
        Self {
            staging,
            ..self.clone()
        }
    }
}
