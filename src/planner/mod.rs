//! Ingest planner - turns (Datasets, IngestMode, options) into logical plans.
//!
//! One [`Planner`] is built per ingest. Construction validates the inputs
//! and derives the main schema when the caller declared none; after that,
//! every `build_*` method is a pure function of the planner's state:
//!
//! 1. Pre-actions: create main and metadata, then recreate working tables
//! 2. Ingest: the milestoning statements of the ingest mode
//! 3. Metadata ingest: one batch row in the metadata table
//! 4. Post-actions: optional staging cleanup
//! 5. Statistics: counts read before and after the ingest
//!
//! Values only known at execution time (the next batch id and data-split
//! bounds) appear as placeholder tokens in the plans.

mod append_only;
mod bitemporal;
mod nontemporal;
pub mod statistics;
mod unitemporal;

pub use statistics::StatisticName;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::dataset::{Dataset, DatasetKind, Datasets, Field, SchemaDefinition};
use crate::ingest_mode::{
    Deduplication, IngestMode, MergeStrategy, TransactionMilestoning, INFINITE_BATCH_ID,
    INFINITE_BATCH_TIME,
};
use crate::logical_plan::LogicalPlan;
use crate::schema_evolution::EvolutionError;
use crate::sql::ddl::{ColumnDef, CreateTable, DropTable};
use crate::sql::dml::{Delete, Insert};
use crate::sql::expr::{
    and_all, coalesce, count_star, current_timestamp, lit_int, lit_str, lit_timestamp, max, placeholder,
    table_col, upper, Expr, ExprExt,
};
use crate::sql::query::{Query, TableRef};
use crate::sql::types::DataType;

/// Replaced with the next batch id of the main table.
pub const NEXT_BATCH_ID_PLACEHOLDER: &str = "{NEXT_BATCH_ID_PATTERN}";

/// Replaced with the lower bound of the current data split; the quotes are part of the token.
pub const DATA_SPLIT_LOWER_BOUND_PLACEHOLDER: &str = "'{DATA_SPLIT_LOWER_BOUND_PLACEHOLDER}'";

/// Replaced with the upper bound of the current data split; the quotes are part of the token.
pub const DATA_SPLIT_UPPER_BOUND_PLACEHOLDER: &str = "'{DATA_SPLIT_UPPER_BOUND_PLACEHOLDER}'";

pub(crate) const MAIN_ALIAS: &str = "sink";
pub(crate) const STAGE_ALIAS: &str = "stage";

/// Errors raised before any SQL is produced.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("{mode} requires primary keys on the staging dataset")]
    MissingPrimaryKeys { mode: &'static str },

    #[error("field '{field}' not found in dataset '{dataset}'")]
    MissingField { dataset: String, field: String },

    #[error("cannot derive a schema for '{0}': staging declares no fields")]
    UndiscoverableSchema(String),

    #[error("{mode} has no data split field")]
    DataSplitsUnsupported { mode: &'static str },

    #[error("invalid data split range [{lower}, {upper}]")]
    InvalidDataSplitRange { lower: i64, upper: i64 },

    #[error("schema evolution failed: {0}")]
    SchemaEvolution(#[from] EvolutionError),
}

pub type PlanResult<T> = Result<T, PlanError>;

/// One inclusive sub-range of a staging batch's data-split column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataSplitRange {
    lower: i64,
    upper: i64,
}

impl DataSplitRange {
    pub fn new(lower: i64, upper: i64) -> PlanResult<Self> {
        if lower > upper {
            return Err(PlanError::InvalidDataSplitRange { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> i64 {
        self.lower
    }

    pub fn upper(&self) -> i64 {
        self.upper
    }

    /// Placeholder substitutions for this range.
    pub fn placeholders(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                DATA_SPLIT_LOWER_BOUND_PLACEHOLDER.to_string(),
                self.lower.to_string(),
            ),
            (
                DATA_SPLIT_UPPER_BOUND_PLACEHOLDER.to_string(),
                self.upper.to_string(),
            ),
        ])
    }
}

/// Planner switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerOptions {
    pub cleanup_staging_data: bool,
    pub collect_statistics: bool,
    pub enable_schema_evolution: bool,
    /// `YYYY-MM-DD HH:MM:SS`; stamped into datetime milestoning and metadata.
    pub batch_start_timestamp: String,
}

/// Facts about the batch known before planning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resources {
    pub staging_data_empty: bool,
}

/// Builds the logical plans of one ingest.
#[derive(Debug, Clone)]
pub struct Planner {
    datasets: Datasets,
    mode: IngestMode,
    options: PlannerOptions,
}

impl Planner {
    /// Validate the inputs and derive the main schema if it is undeclared.
    pub fn new(datasets: &Datasets, mode: &IngestMode, options: PlannerOptions) -> PlanResult<Self> {
        let staging = staging_with_import_digest(&datasets.staging, mode);
        if staging.schema.is_empty() {
            return Err(PlanError::UndiscoverableSchema(datasets.main.name().to_string()));
        }

        let mut datasets = datasets.with_staging_dataset(staging);
        if datasets.main.schema.is_empty() {
            let schema = derive_main_schema(&datasets.staging.schema, mode);
            debug!(main = datasets.main.name(), fields = schema.fields.len(), "derived main schema");
            datasets = datasets.with_main_dataset(datasets.main.clone().with_schema(schema));
        }

        let planner = Self {
            datasets,
            mode: mode.clone(),
            options,
        };
        planner.validate()?;
        Ok(planner)
    }

    pub fn datasets(&self) -> &Datasets {
        &self.datasets
    }

    pub fn mode(&self) -> &IngestMode {
        &self.mode
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    // =========================================================================
    // Phases
    // =========================================================================

    /// Create main and metadata.
    pub fn build_pre_actions(&self) -> LogicalPlan {
        LogicalPlan::of(create_table(&self.datasets.main))
            .then(create_table(&self.datasets.metadata.dataset()))
    }

    /// Recreate the working tables of a bitemporal delta so they match the
    /// current main and staging columns; empty for every other mode.
    pub fn build_working_tables(&self) -> LogicalPlan {
        match &self.mode {
            IngestMode::BitemporalDelta(_) => {
                let work = bitemporal::stage_work_dataset(self);
                let temp = bitemporal::temp_dataset(self);
                LogicalPlan::of(drop_table(&work))
                    .then(drop_table(&temp))
                    .then(create_table(&work))
                    .then(create_table(&temp))
            }
            IngestMode::AppendOnly(_)
            | IngestMode::NontemporalDelta(_)
            | IngestMode::UnitemporalSnapshot(_)
            | IngestMode::UnitemporalDelta(_)
            | IngestMode::BitemporalSnapshot(_) => LogicalPlan::new(),
        }
    }

    /// The milestoning statements; empty when staging holds no rows.
    pub fn build_ingest(&self, resources: &Resources) -> LogicalPlan {
        if resources.staging_data_empty {
            return LogicalPlan::new();
        }
        match &self.mode {
            IngestMode::AppendOnly(mode) => append_only::build_ingest(self, mode),
            IngestMode::NontemporalDelta(_) => nontemporal::build_ingest(self),
            IngestMode::UnitemporalSnapshot(mode) => unitemporal::build_snapshot_ingest(self, mode),
            IngestMode::UnitemporalDelta(_) => unitemporal::build_delta_ingest(self),
            IngestMode::BitemporalSnapshot(_) => bitemporal::build_snapshot_ingest(self),
            IngestMode::BitemporalDelta(_) => bitemporal::build_delta_ingest(self),
        }
    }

    /// One `DONE` row for this batch in the metadata table.
    pub fn build_metadata_ingest(&self) -> LogicalPlan {
        let meta = &self.datasets.metadata;
        let batch_id = if self.mode.uses_batch_id() {
            placeholder(NEXT_BATCH_ID_PLACEHOLDER)
        } else {
            self.next_batch_id_query().into()
        };

        LogicalPlan::of(
            Insert::into(meta.name.clone())
                .schema(meta.group.clone())
                .columns([
                    &meta.table_name_field,
                    &meta.batch_start_ts_field,
                    &meta.batch_end_ts_field,
                    &meta.batch_status_field,
                    &meta.table_batch_id_field,
                ])
                .from_select(Query::new().select(vec![
                    lit_str(self.datasets.main.name()),
                    self.batch_start(),
                    current_timestamp(),
                    lit_str("DONE"),
                    batch_id,
                ])),
        )
    }

    pub fn build_post_actions(&self) -> LogicalPlan {
        if !self.options.cleanup_staging_data {
            return LogicalPlan::new();
        }
        let staging = &self.datasets.staging;
        LogicalPlan::of(Delete::from(staging.name()).schema(staging.group()))
    }

    /// Counts read before the ingest statements run.
    pub fn build_pre_ingest_statistics(
        &self,
        resources: &Resources,
    ) -> BTreeMap<StatisticName, LogicalPlan> {
        if !self.options.collect_statistics || resources.staging_data_empty {
            return BTreeMap::new();
        }
        statistics::pre_ingest(self)
    }

    /// Counts read after the ingest statements run.
    pub fn build_post_ingest_statistics(
        &self,
        resources: &Resources,
    ) -> BTreeMap<StatisticName, LogicalPlan> {
        if !self.options.collect_statistics || resources.staging_data_empty {
            return BTreeMap::new();
        }
        statistics::post_ingest(self)
    }

    /// `SELECT COALESCE(MAX(id), 0) + 1` over this table's metadata rows.
    pub fn build_next_batch_id(&self) -> LogicalPlan {
        LogicalPlan::of(self.next_batch_id_query())
    }

    /// Staging row count ignoring data splits; decides whether a batch is empty.
    pub fn build_staging_count(&self) -> LogicalPlan {
        let query = Query::new()
            .select(vec![count_star()])
            .from(self.staging_ref(STAGE_ALIAS))
            .filter_opt(and_all(self.staging_filters(STAGE_ALIAS)));
        LogicalPlan::of(query)
    }

    /// Main and staging columns schema evolution must leave alone.
    pub fn evolution_ignored_fields(&self) -> Vec<String> {
        let mut ignored: Vec<String> = self
            .mode
            .milestoning_fields()
            .into_iter()
            .map(str::to_string)
            .collect();
        ignored.extend(self.non_data_staging_fields());
        ignored
    }

    fn next_batch_id_query(&self) -> Query {
        let meta = &self.datasets.metadata;
        let meta_ref = {
            let table = TableRef::new(&meta.name).with_alias("meta");
            match &meta.group {
                Some(group) => table.with_schema(group),
                None => table,
            }
        };
        Query::new()
            .select(vec![coalesce(vec![
                max(table_col("meta", &meta.table_batch_id_field)),
                lit_int(0),
            ])
            .add(1)])
            .from(meta_ref)
            .filter(
                upper(table_col("meta", &meta.table_name_field))
                    .eq(upper(lit_str(self.datasets.main.name()))),
            )
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn validate(&self) -> PlanResult<()> {
        let staging = &self.datasets.staging;
        let main = &self.datasets.main;

        if !matches!(self.mode, IngestMode::AppendOnly(_)) && self.primary_keys().is_empty() {
            return Err(PlanError::MissingPrimaryKeys {
                mode: self.mode.name(),
            });
        }

        let mut required: Vec<&str> = Vec::new();
        required.extend(self.mode.digest_field());
        required.extend(self.mode.merge_strategy().delete_field());
        required.extend(self.mode.data_split_field());
        if let Some(validity) = self.mode.validity_milestoning() {
            required.push(validity.derivation().source_from());
            required.extend(validity.derivation().source_thru());
        }
        if let IngestMode::UnitemporalSnapshot(mode) = &self.mode {
            required.extend(mode.partition_fields().iter().map(String::as_str));
        }
        for field in required {
            require_field(staging, field)?;
        }

        for field in self.mode.milestoning_fields() {
            require_field(main, field)?;
        }
        if !self.options.enable_schema_evolution {
            for field in self.data_fields() {
                require_field(main, &field.name)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Shared building blocks
    // =========================================================================

    pub(crate) fn main_ref(&self, alias: &str) -> TableRef {
        table_ref(&self.datasets.main, alias)
    }

    pub(crate) fn staging_ref(&self, alias: &str) -> TableRef {
        table_ref(&self.datasets.staging, alias)
    }

    /// Staging columns copied into main.
    pub(crate) fn data_fields(&self) -> Vec<&Field> {
        let excluded = self.non_data_staging_fields();
        self.datasets
            .staging
            .schema
            .fields
            .iter()
            .filter(|f| !excluded.iter().any(|e| e.eq_ignore_ascii_case(&f.name)))
            .collect()
    }

    pub(crate) fn data_field_names(&self) -> Vec<String> {
        self.data_fields().into_iter().map(|f| f.name.clone()).collect()
    }

    /// Staging keys that identify a main row; validity sources are excluded.
    pub(crate) fn primary_keys(&self) -> Vec<String> {
        let excluded = self.non_data_staging_fields();
        self.datasets
            .staging
            .schema
            .primary_keys()
            .into_iter()
            .filter(|k| !excluded.iter().any(|e| e.eq_ignore_ascii_case(k)))
            .map(str::to_string)
            .collect()
    }

    /// Staging columns that steer the ingest instead of carrying data.
    fn non_data_staging_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        fields.extend(self.mode.merge_strategy().delete_field().map(str::to_string));
        fields.extend(self.mode.data_split_field().map(str::to_string));
        if let Some(validity) = self.mode.validity_milestoning() {
            fields.push(validity.derivation().source_from().to_string());
            fields.extend(validity.derivation().source_thru().map(str::to_string));
        }
        fields
    }

    /// `left.k = right.k` for every primary key.
    pub(crate) fn pk_match(&self, left: &str, right: &str) -> Option<Expr> {
        and_all(
            self.primary_keys()
                .iter()
                .map(|k| table_col(left, k).eq(table_col(right, k))),
        )
    }

    pub(crate) fn digest_field(&self) -> Option<&str> {
        self.mode.digest_field()
    }

    /// Row filters and the data-split window, against staging aliased `alias`.
    pub(crate) fn staging_condition(&self, alias: &str) -> Option<Expr> {
        let mut conditions = self.staging_filters(alias);
        if let Some(split) = self.mode.data_split_field() {
            conditions.push(
                table_col(alias, split).gte(placeholder(DATA_SPLIT_LOWER_BOUND_PLACEHOLDER)),
            );
            conditions.push(
                table_col(alias, split).lte(placeholder(DATA_SPLIT_UPPER_BOUND_PLACEHOLDER)),
            );
        }
        and_all(conditions)
    }

    fn staging_filters(&self, alias: &str) -> Vec<Expr> {
        self.datasets
            .staging
            .filters()
            .iter()
            .map(|f| f.to_expr(alias))
            .collect()
    }

    /// Staging rows flagged as deletes.
    pub(crate) fn deleted(&self, alias: &str) -> Option<Expr> {
        match self.mode.merge_strategy() {
            MergeStrategy::NoDeletes => None,
            MergeStrategy::DeleteIndicator { field, values } => Some(
                table_col(alias, field).in_list(values.iter().map(|v| v.to_expr()).collect()),
            ),
        }
    }

    /// Staging rows not flagged as deletes; a NULL indicator is not a delete.
    pub(crate) fn not_deleted(&self, alias: &str) -> Option<Expr> {
        match self.mode.merge_strategy() {
            MergeStrategy::NoDeletes => None,
            MergeStrategy::DeleteIndicator { field, values } => Some(
                table_col(alias, field).is_null().or(
                    table_col(alias, field).not_in_list(values.iter().map(|v| v.to_expr()).collect()),
                ),
            ),
        }
    }

    /// The batch start timestamp as a literal.
    pub(crate) fn batch_start(&self) -> Expr {
        lit_timestamp(&self.options.batch_start_timestamp)
    }

    /// Transaction in/out columns; only called for temporal modes.
    pub(crate) fn transaction_fields(&self) -> (String, String) {
        match self.mode.transaction_milestoning().fields() {
            Some((tx_in, tx_out)) => (tx_in.to_string(), tx_out.to_string()),
            None => (String::new(), String::new()),
        }
    }

    /// Value stamped into the in column of rows opened by this batch.
    pub(crate) fn batch_in_value(&self) -> Expr {
        match self.mode.transaction_milestoning() {
            TransactionMilestoning::BatchId { .. } => placeholder(NEXT_BATCH_ID_PLACEHOLDER),
            TransactionMilestoning::DateTime { .. } | TransactionMilestoning::None => {
                self.batch_start()
            }
        }
    }

    /// Value stamped into the out column of rows closed by this batch.
    pub(crate) fn batch_close_value(&self) -> Expr {
        match self.mode.transaction_milestoning() {
            TransactionMilestoning::BatchId { .. } => placeholder(NEXT_BATCH_ID_PLACEHOLDER).sub(1),
            TransactionMilestoning::DateTime { .. } | TransactionMilestoning::None => {
                self.batch_start()
            }
        }
    }

    /// The out value of a row that is still current.
    pub(crate) fn open_value(&self) -> Expr {
        match self.mode.transaction_milestoning() {
            TransactionMilestoning::BatchId { .. } => lit_int(INFINITE_BATCH_ID),
            TransactionMilestoning::DateTime { .. } | TransactionMilestoning::None => {
                lit_timestamp(INFINITE_BATCH_TIME)
            }
        }
    }

    /// `alias.out = <infinity>`
    pub(crate) fn is_open(&self, alias: &str) -> Expr {
        let (_, tx_out) = self.transaction_fields();
        table_col(alias, &tx_out).eq(self.open_value())
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub(crate) fn table_ref(dataset: &Dataset, alias: &str) -> TableRef {
    let table = TableRef::new(dataset.name()).with_alias(alias);
    match &dataset.reference.group {
        Some(group) => table.with_schema(group),
        None => table,
    }
}

pub(crate) fn create_table(dataset: &Dataset) -> CreateTable {
    CreateTable::new(dataset.name())
        .schema(dataset.group())
        .if_not_exists()
        .columns(dataset.schema.fields.iter().map(|f| {
            let column = ColumnDef::new(&f.name, f.data_type.clone());
            if f.nullable {
                column
            } else {
                column.not_null()
            }
        }))
        .primary_key(dataset.schema.primary_keys())
}

fn drop_table(dataset: &Dataset) -> DropTable {
    DropTable::new(dataset.name()).schema(dataset.group()).if_exists()
}

fn require_field(dataset: &Dataset, field: &str) -> PlanResult<()> {
    if dataset.schema.contains(field) {
        Ok(())
    } else {
        Err(PlanError::MissingField {
            dataset: dataset.name().to_string(),
            field: field.to_string(),
        })
    }
}

/// External staging gains its digest column during import.
pub(crate) fn staging_with_import_digest(staging: &Dataset, mode: &IngestMode) -> Dataset {
    match (&staging.kind, mode.digest_field()) {
        (DatasetKind::External { .. }, Some(digest)) if !staging.schema.contains(digest) => {
            let mut fields = staging.schema.fields.clone();
            fields.push(Field::new(digest, DataType::Varchar(64)));
            staging.clone().with_schema(SchemaDefinition::new(fields))
        }
        _ => staging.clone(),
    }
}

/// Main schema for an undeclared main table: staging data columns plus the
/// milestoning columns of the mode.
fn derive_main_schema(staging: &SchemaDefinition, mode: &IngestMode) -> SchemaDefinition {
    let mut excluded: Vec<&str> = Vec::new();
    excluded.extend(mode.merge_strategy().delete_field());
    excluded.extend(mode.data_split_field());
    if let Some(validity) = mode.validity_milestoning() {
        excluded.push(validity.derivation().source_from());
        excluded.extend(validity.derivation().source_thru());
    }

    let mut fields: Vec<Field> = staging
        .fields
        .iter()
        .filter(|f| !excluded.iter().any(|e| e.eq_ignore_ascii_case(&f.name)))
        .cloned()
        .collect();

    match mode {
        IngestMode::AppendOnly(append) => {
            if append.deduplication() == Deduplication::AllowDuplicates {
                for field in &mut fields {
                    field.primary_key = false;
                }
            }
            if let Some(audit) = append.audit_field() {
                fields.push(Field::new(audit, DataType::Timestamp).not_null());
            }
        }
        IngestMode::NontemporalDelta(_)
        | IngestMode::UnitemporalSnapshot(_)
        | IngestMode::UnitemporalDelta(_)
        | IngestMode::BitemporalSnapshot(_)
        | IngestMode::BitemporalDelta(_) => {}
    }

    if let Some(validity) = mode.validity_milestoning() {
        fields.push(Field::new(validity.from_field(), DataType::Timestamp).primary_key());
        fields.push(Field::new(validity.thru_field(), DataType::Timestamp));
    }

    match mode.transaction_milestoning() {
        TransactionMilestoning::None => {}
        TransactionMilestoning::BatchId {
            batch_id_in,
            batch_id_out,
        } => {
            fields.push(Field::new(batch_id_in, DataType::Int32).primary_key());
            fields.push(Field::new(batch_id_out, DataType::Int32));
        }
        TransactionMilestoning::DateTime {
            date_time_in,
            date_time_out,
        } => {
            fields.push(Field::new(date_time_in, DataType::Timestamp).primary_key());
            fields.push(Field::new(date_time_out, DataType::Timestamp));
        }
    }

    SchemaDefinition::new(fields)
}
