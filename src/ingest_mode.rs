//! Ingest modes: the closed set of milestoning strategies.
//!
//! Every mode is a separate struct carrying only the parameters valid for
//! it, wrapped in the [`IngestMode`] tagged union. Constructors validate
//! their inputs, so a value that exists is a value the planner can use.
//!
//! | Mode | History | Deletes | Splits |
//! |------|---------|---------|--------|
//! | AppendOnly | none | - | - |
//! | NontemporalDelta | none | delete indicator | ✓ |
//! | UnitemporalSnapshot | transaction | absent rows | - |
//! | UnitemporalDelta | transaction | delete indicator | ✓ |
//! | BitemporalSnapshot | transaction + validity | absent rows | - |
//! | BitemporalDelta | transaction + validity | delete indicator | ✓ |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::FieldValue;

/// Batch id of a row that is still current in transaction time.
pub const INFINITE_BATCH_ID: i64 = 999_999_999;

/// Out/thru timestamp of a row that is still current.
pub const INFINITE_BATCH_TIME: &str = "9999-12-31 23:59:59";

/// Invalid ingest-mode construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("{0} must not be empty")]
    EmptyFieldName(&'static str),

    #[error("delete indicator on '{0}' needs at least one deleted value")]
    NoDeleteValues(String),

    #[error("{mode} requires transaction milestoning")]
    MissingTransactionMilestoning { mode: &'static str },

    #[error("milestoning fields must differ, '{0}' is used twice")]
    DuplicateMilestoningField(String),

    #[error("{mode} requires validity derivation SourceSpecifiesFromAndThruDateTime")]
    UnsupportedValidityDerivation { mode: &'static str },

    #[error("{mode} data splits require batch-id transaction milestoning")]
    DataSplitWithoutBatchId { mode: &'static str },
}

pub type ModeResult<T> = Result<T, ModeError>;

fn non_empty(name: &str, what: &'static str) -> ModeResult<String> {
    if name.trim().is_empty() {
        return Err(ModeError::EmptyFieldName(what));
    }
    Ok(name.to_string())
}

fn distinct(names: &[&str]) -> ModeResult<()> {
    for (i, a) in names.iter().enumerate() {
        if names[i + 1..].iter().any(|b| a.eq_ignore_ascii_case(b)) {
            return Err(ModeError::DuplicateMilestoningField(a.to_string()));
        }
    }
    Ok(())
}

// =============================================================================
// Milestoning Strategies
// =============================================================================

/// How rows record when they were current in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionMilestoning {
    None,
    /// Integer batch ids; an open row has out = [`INFINITE_BATCH_ID`].
    BatchId {
        batch_id_in: String,
        batch_id_out: String,
    },
    /// Batch start timestamps; an open row has out = [`INFINITE_BATCH_TIME`].
    DateTime {
        date_time_in: String,
        date_time_out: String,
    },
}

impl TransactionMilestoning {
    pub fn batch_id(batch_id_in: &str, batch_id_out: &str) -> ModeResult<Self> {
        let milestoning = TransactionMilestoning::BatchId {
            batch_id_in: non_empty(batch_id_in, "batch_id_in")?,
            batch_id_out: non_empty(batch_id_out, "batch_id_out")?,
        };
        distinct(&[batch_id_in, batch_id_out])?;
        Ok(milestoning)
    }

    pub fn date_time(date_time_in: &str, date_time_out: &str) -> ModeResult<Self> {
        let milestoning = TransactionMilestoning::DateTime {
            date_time_in: non_empty(date_time_in, "date_time_in")?,
            date_time_out: non_empty(date_time_out, "date_time_out")?,
        };
        distinct(&[date_time_in, date_time_out])?;
        Ok(milestoning)
    }

    /// The in/out column pair, `None` when rows are not milestoned.
    pub fn fields(&self) -> Option<(&str, &str)> {
        match self {
            TransactionMilestoning::None => None,
            TransactionMilestoning::BatchId {
                batch_id_in,
                batch_id_out,
            } => Some((batch_id_in, batch_id_out)),
            TransactionMilestoning::DateTime {
                date_time_in,
                date_time_out,
            } => Some((date_time_in, date_time_out)),
        }
    }

    fn require(self, mode: &'static str) -> ModeResult<Self> {
        match self {
            TransactionMilestoning::None => {
                Err(ModeError::MissingTransactionMilestoning { mode })
            }
            other => Ok(other),
        }
    }
}

/// Where a row's business validity interval comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidityDerivation {
    /// Staging supplies only the start; the end is the next start for the
    /// same key, or infinity.
    SourceSpecifiesFromDateTime { source_from: String },
    /// Staging supplies both bounds.
    SourceSpecifiesFromAndThruDateTime {
        source_from: String,
        source_thru: String,
    },
}

impl ValidityDerivation {
    pub fn source_from(&self) -> &str {
        match self {
            ValidityDerivation::SourceSpecifiesFromDateTime { source_from }
            | ValidityDerivation::SourceSpecifiesFromAndThruDateTime { source_from, .. } => {
                source_from
            }
        }
    }

    pub fn source_thru(&self) -> Option<&str> {
        match self {
            ValidityDerivation::SourceSpecifiesFromDateTime { .. } => None,
            ValidityDerivation::SourceSpecifiesFromAndThruDateTime { source_thru, .. } => {
                Some(source_thru)
            }
        }
    }
}

/// Business validity columns of the main table plus their derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityMilestoning {
    date_time_from: String,
    date_time_thru: String,
    derivation: ValidityDerivation,
}

impl ValidityMilestoning {
    pub fn new(
        date_time_from: &str,
        date_time_thru: &str,
        derivation: ValidityDerivation,
    ) -> ModeResult<Self> {
        non_empty(derivation.source_from(), "source_from")?;
        if let Some(thru) = derivation.source_thru() {
            non_empty(thru, "source_thru")?;
        }
        let validity = Self {
            date_time_from: non_empty(date_time_from, "date_time_from")?,
            date_time_thru: non_empty(date_time_thru, "date_time_thru")?,
            derivation,
        };
        distinct(&[date_time_from, date_time_thru])?;
        Ok(validity)
    }

    pub fn from_field(&self) -> &str {
        &self.date_time_from
    }

    pub fn thru_field(&self) -> &str {
        &self.date_time_thru
    }

    pub fn derivation(&self) -> &ValidityDerivation {
        &self.derivation
    }
}

/// How deleted rows are recognized in staging.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MergeStrategy {
    #[default]
    NoDeletes,
    /// Rows whose `field` holds one of `values` are deletes.
    DeleteIndicator {
        field: String,
        values: Vec<FieldValue>,
    },
}

impl MergeStrategy {
    pub fn delete_indicator(field: &str, values: Vec<FieldValue>) -> ModeResult<Self> {
        let field = non_empty(field, "delete indicator field")?;
        if values.is_empty() {
            return Err(ModeError::NoDeleteValues(field));
        }
        Ok(MergeStrategy::DeleteIndicator { field, values })
    }

    /// The delete indicator field, if any.
    pub fn delete_field(&self) -> Option<&str> {
        match self {
            MergeStrategy::NoDeletes => None,
            MergeStrategy::DeleteIndicator { field, .. } => Some(field),
        }
    }
}

/// How an append-only ingest treats rows already in main.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deduplication {
    #[default]
    AllowDuplicates,
    /// Skip staging rows identical to a main row.
    FilterDuplicates,
    /// Keep the primary key on main so colliding rows fail the batch.
    FailOnDuplicates,
}

// =============================================================================
// Modes
// =============================================================================

/// Insert-only ingest with no history columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppendOnly {
    digest_field: Option<String>,
    deduplication: Deduplication,
    audit_field: Option<String>,
}

impl AppendOnly {
    pub fn new(deduplication: Deduplication) -> Self {
        Self {
            deduplication,
            ..Self::default()
        }
    }

    pub fn with_digest(self, digest_field: &str) -> ModeResult<Self> {
        Ok(Self {
            digest_field: Some(non_empty(digest_field, "digest_field")?),
            ..self
        })
    }

    /// Stamp every appended row with the batch start timestamp.
    pub fn with_audit(self, audit_field: &str) -> ModeResult<Self> {
        Ok(Self {
            audit_field: Some(non_empty(audit_field, "audit_field")?),
            ..self
        })
    }

    pub fn digest_field(&self) -> Option<&str> {
        self.digest_field.as_deref()
    }

    pub fn deduplication(&self) -> Deduplication {
        self.deduplication
    }

    pub fn audit_field(&self) -> Option<&str> {
        self.audit_field.as_deref()
    }
}

/// Primary-key upsert with no history.
#[derive(Debug, Clone, PartialEq)]
pub struct NontemporalDelta {
    digest_field: String,
    merge_strategy: MergeStrategy,
    data_split_field: Option<String>,
}

impl NontemporalDelta {
    pub fn new(digest_field: &str) -> ModeResult<Self> {
        Ok(Self {
            digest_field: non_empty(digest_field, "digest_field")?,
            merge_strategy: MergeStrategy::NoDeletes,
            data_split_field: None,
        })
    }

    pub fn with_merge_strategy(self, merge_strategy: MergeStrategy) -> Self {
        Self {
            merge_strategy,
            ..self
        }
    }

    pub fn with_data_split(self, data_split_field: &str) -> ModeResult<Self> {
        Ok(Self {
            data_split_field: Some(non_empty(data_split_field, "data_split_field")?),
            ..self
        })
    }
}

/// Staging is the full current image; rows absent from it are closed.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitemporalSnapshot {
    digest_field: String,
    transaction_milestoning: TransactionMilestoning,
    partition_fields: Vec<String>,
}

impl UnitemporalSnapshot {
    pub fn new(digest_field: &str, transaction_milestoning: TransactionMilestoning) -> ModeResult<Self> {
        Ok(Self {
            digest_field: non_empty(digest_field, "digest_field")?,
            transaction_milestoning: transaction_milestoning.require("UnitemporalSnapshot")?,
            partition_fields: Vec::new(),
        })
    }

    /// Only close rows of partitions present in staging.
    pub fn with_partition_fields(self, partition_fields: &[&str]) -> ModeResult<Self> {
        let partition_fields = partition_fields
            .iter()
            .map(|f| non_empty(f, "partition field"))
            .collect::<ModeResult<Vec<_>>>()?;
        Ok(Self {
            partition_fields,
            ..self
        })
    }

    pub fn partition_fields(&self) -> &[String] {
        &self.partition_fields
    }
}

/// Staging holds changes only; absent rows are left open.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitemporalDelta {
    digest_field: String,
    transaction_milestoning: TransactionMilestoning,
    merge_strategy: MergeStrategy,
    data_split_field: Option<String>,
}

impl UnitemporalDelta {
    pub fn new(digest_field: &str, transaction_milestoning: TransactionMilestoning) -> ModeResult<Self> {
        Ok(Self {
            digest_field: non_empty(digest_field, "digest_field")?,
            transaction_milestoning: transaction_milestoning.require("UnitemporalDelta")?,
            merge_strategy: MergeStrategy::NoDeletes,
            data_split_field: None,
        })
    }

    pub fn with_merge_strategy(self, merge_strategy: MergeStrategy) -> Self {
        Self {
            merge_strategy,
            ..self
        }
    }

    /// Splits of one batch share its start time, so each split needs its own batch id.
    pub fn with_data_split(self, data_split_field: &str) -> ModeResult<Self> {
        split_milestoning(&self.transaction_milestoning, "UnitemporalDelta")?;
        Ok(Self {
            data_split_field: Some(non_empty(data_split_field, "data_split_field")?),
            ..self
        })
    }
}

/// Full image of explicit validity intervals, with transaction history.
#[derive(Debug, Clone, PartialEq)]
pub struct BitemporalSnapshot {
    digest_field: String,
    transaction_milestoning: TransactionMilestoning,
    validity_milestoning: ValidityMilestoning,
}

impl BitemporalSnapshot {
    pub fn new(
        digest_field: &str,
        transaction_milestoning: TransactionMilestoning,
        validity_milestoning: ValidityMilestoning,
    ) -> ModeResult<Self> {
        if validity_milestoning.derivation().source_thru().is_none() {
            return Err(ModeError::UnsupportedValidityDerivation {
                mode: "BitemporalSnapshot",
            });
        }
        Ok(Self {
            digest_field: non_empty(digest_field, "digest_field")?,
            transaction_milestoning: transaction_milestoning.require("BitemporalSnapshot")?,
            validity_milestoning,
        })
    }
}

/// Changes to validity intervals, with transaction history.
#[derive(Debug, Clone, PartialEq)]
pub struct BitemporalDelta {
    digest_field: String,
    transaction_milestoning: TransactionMilestoning,
    validity_milestoning: ValidityMilestoning,
    merge_strategy: MergeStrategy,
    data_split_field: Option<String>,
}

impl BitemporalDelta {
    pub fn new(
        digest_field: &str,
        transaction_milestoning: TransactionMilestoning,
        validity_milestoning: ValidityMilestoning,
    ) -> ModeResult<Self> {
        Ok(Self {
            digest_field: non_empty(digest_field, "digest_field")?,
            transaction_milestoning: transaction_milestoning.require("BitemporalDelta")?,
            validity_milestoning,
            merge_strategy: MergeStrategy::NoDeletes,
            data_split_field: None,
        })
    }

    pub fn with_merge_strategy(self, merge_strategy: MergeStrategy) -> Self {
        Self {
            merge_strategy,
            ..self
        }
    }

    pub fn with_data_split(self, data_split_field: &str) -> ModeResult<Self> {
        split_milestoning(&self.transaction_milestoning, "BitemporalDelta")?;
        Ok(Self {
            data_split_field: Some(non_empty(data_split_field, "data_split_field")?),
            ..self
        })
    }
}

fn split_milestoning(transaction: &TransactionMilestoning, mode: &'static str) -> ModeResult<()> {
    match transaction {
        TransactionMilestoning::BatchId { .. } => Ok(()),
        TransactionMilestoning::None | TransactionMilestoning::DateTime { .. } => {
            Err(ModeError::DataSplitWithoutBatchId { mode })
        }
    }
}

// =============================================================================
// IngestMode
// =============================================================================

/// Every supported milestoning strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestMode {
    AppendOnly(AppendOnly),
    NontemporalDelta(NontemporalDelta),
    UnitemporalSnapshot(UnitemporalSnapshot),
    UnitemporalDelta(UnitemporalDelta),
    BitemporalSnapshot(BitemporalSnapshot),
    BitemporalDelta(BitemporalDelta),
}

impl IngestMode {
    pub fn name(&self) -> &'static str {
        match self {
            IngestMode::AppendOnly(_) => "AppendOnly",
            IngestMode::NontemporalDelta(_) => "NontemporalDelta",
            IngestMode::UnitemporalSnapshot(_) => "UnitemporalSnapshot",
            IngestMode::UnitemporalDelta(_) => "UnitemporalDelta",
            IngestMode::BitemporalSnapshot(_) => "BitemporalSnapshot",
            IngestMode::BitemporalDelta(_) => "BitemporalDelta",
        }
    }

    pub fn digest_field(&self) -> Option<&str> {
        match self {
            IngestMode::AppendOnly(m) => m.digest_field(),
            IngestMode::NontemporalDelta(m) => Some(&m.digest_field),
            IngestMode::UnitemporalSnapshot(m) => Some(&m.digest_field),
            IngestMode::UnitemporalDelta(m) => Some(&m.digest_field),
            IngestMode::BitemporalSnapshot(m) => Some(&m.digest_field),
            IngestMode::BitemporalDelta(m) => Some(&m.digest_field),
        }
    }

    pub fn transaction_milestoning(&self) -> &TransactionMilestoning {
        match self {
            IngestMode::AppendOnly(_) | IngestMode::NontemporalDelta(_) => {
                &TransactionMilestoning::None
            }
            IngestMode::UnitemporalSnapshot(m) => &m.transaction_milestoning,
            IngestMode::UnitemporalDelta(m) => &m.transaction_milestoning,
            IngestMode::BitemporalSnapshot(m) => &m.transaction_milestoning,
            IngestMode::BitemporalDelta(m) => &m.transaction_milestoning,
        }
    }

    pub fn validity_milestoning(&self) -> Option<&ValidityMilestoning> {
        match self {
            IngestMode::BitemporalSnapshot(m) => Some(&m.validity_milestoning),
            IngestMode::BitemporalDelta(m) => Some(&m.validity_milestoning),
            IngestMode::AppendOnly(_)
            | IngestMode::NontemporalDelta(_)
            | IngestMode::UnitemporalSnapshot(_)
            | IngestMode::UnitemporalDelta(_) => None,
        }
    }

    pub fn merge_strategy(&self) -> &MergeStrategy {
        match self {
            IngestMode::NontemporalDelta(m) => &m.merge_strategy,
            IngestMode::UnitemporalDelta(m) => &m.merge_strategy,
            IngestMode::BitemporalDelta(m) => &m.merge_strategy,
            IngestMode::AppendOnly(_)
            | IngestMode::UnitemporalSnapshot(_)
            | IngestMode::BitemporalSnapshot(_) => &MergeStrategy::NoDeletes,
        }
    }

    pub fn data_split_field(&self) -> Option<&str> {
        match self {
            IngestMode::NontemporalDelta(m) => m.data_split_field.as_deref(),
            IngestMode::UnitemporalDelta(m) => m.data_split_field.as_deref(),
            IngestMode::BitemporalDelta(m) => m.data_split_field.as_deref(),
            IngestMode::AppendOnly(_)
            | IngestMode::UnitemporalSnapshot(_)
            | IngestMode::BitemporalSnapshot(_) => None,
        }
    }

    /// Whether ingest needs the next batch id resolved at execution time.
    pub fn uses_batch_id(&self) -> bool {
        matches!(
            self.transaction_milestoning(),
            TransactionMilestoning::BatchId { .. }
        )
    }

    /// Columns the ingest mode adds to main on top of the staging data.
    pub fn milestoning_fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        if let IngestMode::AppendOnly(m) = self {
            fields.extend(m.audit_field());
        }
        if let Some((tx_in, tx_out)) = self.transaction_milestoning().fields() {
            fields.extend([tx_in, tx_out]);
        }
        if let Some(validity) = self.validity_milestoning() {
            fields.extend([validity.from_field(), validity.thru_field()]);
        }
        fields
    }
}
