//! TOML job files.
//!
//! A job names the sink, the generator options, the ingest mode and the
//! datasets of one ingest. Paths support environment variable expansion.
//!
//! Example job:
//! ```toml
//! sink = "sqlite"
//!
//! [options]
//! collect_statistics = true
//! batch_start_timestamp = "2000-01-01 00:00:00"
//!
//! [mode]
//! type = "unitemporal_delta"
//! digest_field = "digest"
//! transaction = { type = "batch_id", batch_id_in = "batch_id_in", batch_id_out = "batch_id_out" }
//! delete_indicator = { field = "op", values = ["D"] }
//!
//! [main]
//! name = "customers"
//! fields = [
//!     { name = "id", type = "int", primary_key = true },
//!     { name = "name", type = "varchar(64)" },
//! ]
//!
//! [staging]
//! name = "customers_staging"
//! file = "${DATA_DIR}/customers.json"
//! fields = [
//!     { name = "id", type = "int", primary_key = true },
//!     { name = "name", type = "varchar(64)" },
//!     { name = "op", type = "varchar(1)" },
//! ]
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::{
    Dataset, DatasetFilter, Datasets, ExternalSource, Field, FieldValue, MetadataDataset,
};
use crate::generator::GeneratorOptions;
use crate::ingest_mode::{
    AppendOnly, BitemporalDelta, BitemporalSnapshot, Deduplication, IngestMode, MergeStrategy,
    ModeError, NontemporalDelta, TransactionMilestoning, UnitemporalDelta, UnitemporalSnapshot,
    ValidityDerivation, ValidityMilestoning,
};
use crate::transformer::{Sink, SinkRegistry};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Job file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read job file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse job file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Sink not found: {0}")]
    SinkNotFound(String),

    #[error("Invalid ingest mode: {0}")]
    InvalidMode(#[from] ModeError),
}

/// Root of a job file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Registered sink name, e.g. `sqlite` or `snowflake`.
    pub sink: String,

    #[serde(default)]
    pub options: GeneratorOptions,

    pub mode: ModeSettings,

    pub main: DatasetSettings,

    pub staging: DatasetSettings,

    #[serde(default)]
    pub metadata: MetadataDataset,
}

/// One table declaration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub group: Option<String>,
    pub name: String,
    pub fields: Vec<Field>,
    /// Row filters; makes staging a derived dataset.
    pub filters: Vec<DatasetFilter>,
    /// JSON rows file (supports `${ENV_VAR}` expansion); makes staging external.
    pub file: Option<String>,
}

impl DatasetSettings {
    pub fn to_dataset(&self) -> Result<Dataset, SettingsError> {
        let dataset = match (&self.file, self.filters.is_empty()) {
            (Some(file), _) => Dataset::external(
                self.name.clone(),
                self.fields.clone(),
                ExternalSource::File(PathBuf::from(expand_env_vars(file)?)),
            ),
            (None, false) => {
                Dataset::derived(self.name.clone(), self.fields.clone(), self.filters.clone())
            }
            (None, true) => Dataset::definition(self.name.clone(), self.fields.clone()),
        };
        Ok(match &self.group {
            Some(group) => dataset.with_group(group.clone()),
            None => dataset,
        })
    }
}

/// Transaction milestoning columns.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionSettings {
    BatchId {
        batch_id_in: String,
        batch_id_out: String,
    },
    DateTime {
        date_time_in: String,
        date_time_out: String,
    },
}

impl TransactionSettings {
    fn to_milestoning(&self) -> Result<TransactionMilestoning, ModeError> {
        match self {
            TransactionSettings::BatchId {
                batch_id_in,
                batch_id_out,
            } => TransactionMilestoning::batch_id(batch_id_in, batch_id_out),
            TransactionSettings::DateTime {
                date_time_in,
                date_time_out,
            } => TransactionMilestoning::date_time(date_time_in, date_time_out),
        }
    }
}

/// Validity milestoning columns; `source_thru` absent means from-only derivation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValiditySettings {
    pub date_time_from: String,
    pub date_time_thru: String,
    pub source_from: String,
    #[serde(default)]
    pub source_thru: Option<String>,
}

impl ValiditySettings {
    fn to_milestoning(&self) -> Result<ValidityMilestoning, ModeError> {
        let derivation = match &self.source_thru {
            Some(source_thru) => ValidityDerivation::SourceSpecifiesFromAndThruDateTime {
                source_from: self.source_from.clone(),
                source_thru: source_thru.clone(),
            },
            None => ValidityDerivation::SourceSpecifiesFromDateTime {
                source_from: self.source_from.clone(),
            },
        };
        ValidityMilestoning::new(&self.date_time_from, &self.date_time_thru, derivation)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeleteIndicatorSettings {
    pub field: String,
    pub values: Vec<FieldValue>,
}

fn merge_strategy(delete: &Option<DeleteIndicatorSettings>) -> Result<MergeStrategy, ModeError> {
    match delete {
        Some(d) => MergeStrategy::delete_indicator(&d.field, d.values.clone()),
        None => Ok(MergeStrategy::NoDeletes),
    }
}

/// The ingest mode, tagged by `type`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModeSettings {
    AppendOnly {
        #[serde(default)]
        digest_field: Option<String>,
        #[serde(default)]
        deduplication: Deduplication,
        #[serde(default)]
        audit_field: Option<String>,
    },
    NontemporalDelta {
        digest_field: String,
        #[serde(default)]
        delete_indicator: Option<DeleteIndicatorSettings>,
        #[serde(default)]
        data_split_field: Option<String>,
    },
    UnitemporalSnapshot {
        digest_field: String,
        transaction: TransactionSettings,
        #[serde(default)]
        partition_fields: Vec<String>,
    },
    UnitemporalDelta {
        digest_field: String,
        transaction: TransactionSettings,
        #[serde(default)]
        delete_indicator: Option<DeleteIndicatorSettings>,
        #[serde(default)]
        data_split_field: Option<String>,
    },
    BitemporalSnapshot {
        digest_field: String,
        transaction: TransactionSettings,
        validity: ValiditySettings,
    },
    BitemporalDelta {
        digest_field: String,
        transaction: TransactionSettings,
        validity: ValiditySettings,
        #[serde(default)]
        delete_indicator: Option<DeleteIndicatorSettings>,
        #[serde(default)]
        data_split_field: Option<String>,
    },
}

impl ModeSettings {
    pub fn to_ingest_mode(&self) -> Result<IngestMode, ModeError> {
        Ok(match self {
            ModeSettings::AppendOnly {
                digest_field,
                deduplication,
                audit_field,
            } => {
                let mut mode = AppendOnly::new(*deduplication);
                if let Some(digest) = digest_field {
                    mode = mode.with_digest(digest)?;
                }
                if let Some(audit) = audit_field {
                    mode = mode.with_audit(audit)?;
                }
                IngestMode::AppendOnly(mode)
            }
            ModeSettings::NontemporalDelta {
                digest_field,
                delete_indicator,
                data_split_field,
            } => {
                let mode = NontemporalDelta::new(digest_field)?
                    .with_merge_strategy(merge_strategy(delete_indicator)?);
                IngestMode::NontemporalDelta(match data_split_field {
                    Some(split) => mode.with_data_split(split)?,
                    None => mode,
                })
            }
            ModeSettings::UnitemporalSnapshot {
                digest_field,
                transaction,
                partition_fields,
            } => {
                let fields: Vec<&str> = partition_fields.iter().map(String::as_str).collect();
                IngestMode::UnitemporalSnapshot(
                    UnitemporalSnapshot::new(digest_field, transaction.to_milestoning()?)?
                        .with_partition_fields(&fields)?,
                )
            }
            ModeSettings::UnitemporalDelta {
                digest_field,
                transaction,
                delete_indicator,
                data_split_field,
            } => {
                let mode = UnitemporalDelta::new(digest_field, transaction.to_milestoning()?)?
                    .with_merge_strategy(merge_strategy(delete_indicator)?);
                IngestMode::UnitemporalDelta(match data_split_field {
                    Some(split) => mode.with_data_split(split)?,
                    None => mode,
                })
            }
            ModeSettings::BitemporalSnapshot {
                digest_field,
                transaction,
                validity,
            } => IngestMode::BitemporalSnapshot(BitemporalSnapshot::new(
                digest_field,
                transaction.to_milestoning()?,
                validity.to_milestoning()?,
            )?),
            ModeSettings::BitemporalDelta {
                digest_field,
                transaction,
                validity,
                delete_indicator,
                data_split_field,
            } => {
                let mode = BitemporalDelta::new(
                    digest_field,
                    transaction.to_milestoning()?,
                    validity.to_milestoning()?,
                )?
                .with_merge_strategy(merge_strategy(delete_indicator)?);
                IngestMode::BitemporalDelta(match data_split_field {
                    Some(split) => mode.with_data_split(split)?,
                    None => mode,
                })
            }
        })
    }
}

impl FromStr for Settings {
    type Err = SettingsError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(content)?)
    }
}

impl Settings {
    /// Load a job from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        content.parse()
    }

    pub fn ingest_mode(&self) -> Result<IngestMode, SettingsError> {
        Ok(self.mode.to_ingest_mode()?)
    }

    pub fn datasets(&self) -> Result<Datasets, SettingsError> {
        Ok(
            Datasets::new(self.main.to_dataset()?, self.staging.to_dataset()?)
                .with_metadata(self.metadata.clone()),
        )
    }

    /// Look the job's sink up in `registry`.
    pub fn sink(&self, registry: &SinkRegistry) -> Result<Sink, SettingsError> {
        registry
            .get(&self.sink)
            .cloned()
            .ok_or_else(|| SettingsError::SinkNotFound(self.sink.clone()))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        let var_name: String = if chars.peek() == Some(&'{') {
            chars.next();
            chars.by_ref().take_while(|&ch| ch != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            name
        };
        if var_name.is_empty() {
            // A lone $ is kept
            result.push('$');
            continue;
        }
        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}
