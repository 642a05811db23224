//! Generator - plan and render every SQL statement of one ingest.
//!
//! [`RelationalGenerator`] ties the [`Planner`] to a sink's
//! [`RelationalTransformer`] and returns a [`GeneratorResult`]: the complete,
//! immutable SQL of an ingest. Nothing here touches a connection, so the same
//! inputs always yield the same text.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::dataset::{Dataset, Datasets};
use crate::ingest_mode::IngestMode;
use crate::logical_plan::LogicalPlan;
use crate::planner::{
    DataSplitRange, PlanError, Planner, PlannerOptions, Resources, StatisticName,
};
use crate::schema_evolution::SchemaEvolution;
use crate::transformer::{CaseConversion, RelationalTransformer, Sink, SqlPlan, TransformOptions};

/// Timestamp layout of batch start times.
pub const BATCH_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("batch start timestamp '{0}' is not in YYYY-MM-DD HH:MM:SS form")]
    InvalidBatchStartTimestamp(String),
}

pub type GeneratorOutcome<T> = Result<T, GeneratorError>;

// =============================================================================
// Options
// =============================================================================

/// Generator switches. Setters return a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    pub cleanup_staging_data: bool,
    pub collect_statistics: bool,
    pub enable_schema_evolution: bool,
    pub case_conversion: CaseConversion,
    /// Fixed clock for reproducible output; the current UTC time when unset.
    pub batch_start_timestamp: Option<String>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            cleanup_staging_data: true,
            collect_statistics: false,
            enable_schema_evolution: false,
            case_conversion: CaseConversion::None,
            batch_start_timestamp: None,
        }
    }
}

impl GeneratorOptions {
    pub fn cleanup_staging_data(self, cleanup_staging_data: bool) -> Self {
        Self {
            cleanup_staging_data,
            ..self
        }
    }

    pub fn collect_statistics(self, collect_statistics: bool) -> Self {
        Self {
            collect_statistics,
            ..self
        }
    }

    pub fn enable_schema_evolution(self, enable_schema_evolution: bool) -> Self {
        Self {
            enable_schema_evolution,
            ..self
        }
    }

    pub fn case_conversion(self, case_conversion: CaseConversion) -> Self {
        Self {
            case_conversion,
            ..self
        }
    }

    pub fn batch_start_timestamp(self, timestamp: impl Into<String>) -> Self {
        Self {
            batch_start_timestamp: Some(timestamp.into()),
            ..self
        }
    }

    fn resolve_batch_start(&self) -> GeneratorOutcome<String> {
        match &self.batch_start_timestamp {
            Some(ts) => NaiveDateTime::parse_from_str(ts, BATCH_TIMESTAMP_FORMAT)
                .map(|_| ts.clone())
                .map_err(|_| GeneratorError::InvalidBatchStartTimestamp(ts.clone())),
            None => Ok(Utc::now().format(BATCH_TIMESTAMP_FORMAT).to_string()),
        }
    }
}

// =============================================================================
// Result
// =============================================================================

/// Every SQL plan of one ingest pass.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct GeneratorResult {
    pre_actions: SqlPlan,
    schema_evolution: Option<SqlPlan>,
    schema_evolution_dataset: Option<Dataset>,
    ingest: SqlPlan,
    ingest_data_split_range: Option<DataSplitRange>,
    metadata_ingest: SqlPlan,
    post_actions: SqlPlan,
    pre_ingest_statistics: BTreeMap<StatisticName, SqlPlan>,
    post_ingest_statistics: BTreeMap<StatisticName, SqlPlan>,
    next_batch_id: Option<SqlPlan>,
    batch_start_timestamp: String,
}

impl GeneratorResult {
    pub fn pre_actions_sql_plan(&self) -> &SqlPlan {
        &self.pre_actions
    }

    /// Present when evolution ran and found something to alter.
    pub fn schema_evolution_sql_plan(&self) -> Option<&SqlPlan> {
        self.schema_evolution.as_ref()
    }

    /// The main dataset as it looks after evolution.
    pub fn schema_evolution_dataset(&self) -> Option<&Dataset> {
        self.schema_evolution_dataset.as_ref()
    }

    pub fn ingest_sql_plan(&self) -> &SqlPlan {
        &self.ingest
    }

    pub fn ingest_data_split_range(&self) -> Option<DataSplitRange> {
        self.ingest_data_split_range
    }

    pub fn metadata_ingest_sql_plan(&self) -> &SqlPlan {
        &self.metadata_ingest
    }

    pub fn post_actions_sql_plan(&self) -> &SqlPlan {
        &self.post_actions
    }

    pub fn pre_ingest_statistics_sql_plan(&self) -> &BTreeMap<StatisticName, SqlPlan> {
        &self.pre_ingest_statistics
    }

    pub fn post_ingest_statistics_sql_plan(&self) -> &BTreeMap<StatisticName, SqlPlan> {
        &self.post_ingest_statistics
    }

    /// Query resolving the next-batch-id placeholder; only for batch-id modes.
    pub fn next_batch_id_sql_plan(&self) -> Option<&SqlPlan> {
        self.next_batch_id.as_ref()
    }

    pub fn batch_start_timestamp(&self) -> &str {
        &self.batch_start_timestamp
    }
}

// =============================================================================
// Generator
// =============================================================================

/// Generates the SQL of an ingest mode for one sink.
#[derive(Debug, Clone)]
pub struct RelationalGenerator {
    mode: IngestMode,
    sink: Sink,
    options: GeneratorOptions,
}

impl RelationalGenerator {
    pub fn new(mode: IngestMode, sink: Sink, options: GeneratorOptions) -> Self {
        Self {
            mode,
            sink,
            options,
        }
    }

    pub fn mode(&self) -> &IngestMode {
        &self.mode
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    pub fn generate_operations(&self, datasets: &Datasets) -> GeneratorOutcome<GeneratorResult> {
        let batch_start = self.options.resolve_batch_start()?;
        self.generate(datasets, Resources::default(), None, batch_start)
    }

    /// The same phases with no ingest statements and no statistics.
    pub fn generate_operations_for_empty_batch(
        &self,
        datasets: &Datasets,
    ) -> GeneratorOutcome<GeneratorResult> {
        let batch_start = self.options.resolve_batch_start()?;
        let resources = Resources {
            staging_data_empty: true,
        };
        self.generate(datasets, resources, None, batch_start)
    }

    /// One result per range, all sharing the same batch start time.
    pub fn generate_operations_with_data_splits(
        &self,
        datasets: &Datasets,
        ranges: &[DataSplitRange],
    ) -> GeneratorOutcome<Vec<GeneratorResult>> {
        if self.mode.data_split_field().is_none() {
            return Err(PlanError::DataSplitsUnsupported {
                mode: self.mode.name(),
            }
            .into());
        }
        let batch_start = self.options.resolve_batch_start()?;
        ranges
            .iter()
            .map(|range| {
                self.generate(datasets, Resources::default(), Some(*range), batch_start.clone())
            })
            .collect()
    }

    /// `SELECT COUNT(*)` over staging, used to detect an empty batch.
    pub fn generate_staging_count(&self, datasets: &Datasets) -> GeneratorOutcome<SqlPlan> {
        let batch_start = self.options.resolve_batch_start()?;
        let planner = Planner::new(datasets, &self.mode, self.planner_options(batch_start))?;
        Ok(self.transformer().generate_physical_plan(&planner.build_staging_count()))
    }

    fn generate(
        &self,
        datasets: &Datasets,
        resources: Resources,
        range: Option<DataSplitRange>,
        batch_start: String,
    ) -> GeneratorOutcome<GeneratorResult> {
        info!(
            mode = self.mode.name(),
            sink = self.sink.name(),
            main = datasets.main.name(),
            empty = resources.staging_data_empty,
            "generating ingest operations"
        );
        let options = self.planner_options(batch_start.clone());
        let mut planner = Planner::new(datasets, &self.mode, options.clone())?;
        let pre_actions = planner.build_pre_actions();

        let mut evolution = None;
        if self.options.enable_schema_evolution {
            let result = SchemaEvolution::new(self.sink.dialect(), self.sink.widening())
                .build_for(
                    &planner.datasets().main,
                    &planner.datasets().staging,
                    &planner.evolution_ignored_fields(),
                )
                .map_err(PlanError::from)?;
            if !result.plan.is_empty() {
                debug!(
                    statements = result.plan.len(),
                    "schema evolution altered main"
                );
                planner = Planner::new(
                    &planner.datasets().with_main_dataset(result.evolved.clone()),
                    &self.mode,
                    options,
                )?;
                evolution = Some(result);
            }
        }

        // Working tables follow the evolved main, so they come from the final planner
        let pre_actions = pre_actions.then_all(planner.build_working_tables());

        let transformer = self.transformer();
        let render = |plan: &LogicalPlan| transformer.generate_physical_plan(plan);
        let render_all = |plans: BTreeMap<StatisticName, LogicalPlan>| {
            plans
                .into_iter()
                .map(|(name, plan)| (name, render(&plan)))
                .collect::<BTreeMap<_, _>>()
        };

        let result = GeneratorResult {
            pre_actions: render(&pre_actions),
            schema_evolution: evolution.as_ref().map(|e| render(&e.plan)),
            schema_evolution_dataset: evolution.map(|e| e.evolved),
            ingest: render(&planner.build_ingest(&resources)),
            ingest_data_split_range: range,
            metadata_ingest: render(&planner.build_metadata_ingest()),
            post_actions: render(&planner.build_post_actions()),
            pre_ingest_statistics: render_all(planner.build_pre_ingest_statistics(&resources)),
            post_ingest_statistics: render_all(planner.build_post_ingest_statistics(&resources)),
            next_batch_id: self
                .mode
                .uses_batch_id()
                .then(|| render(&planner.build_next_batch_id())),
            batch_start_timestamp: batch_start,
        };
        debug!(
            ingest = result.ingest.len(),
            pre_actions = result.pre_actions.len(),
            "generated sql plans"
        );
        Ok(result)
    }

    fn planner_options(&self, batch_start_timestamp: String) -> PlannerOptions {
        PlannerOptions {
            cleanup_staging_data: self.options.cleanup_staging_data,
            collect_statistics: self.options.collect_statistics,
            enable_schema_evolution: self.options.enable_schema_evolution,
            batch_start_timestamp,
        }
    }

    fn transformer(&self) -> RelationalTransformer {
        RelationalTransformer::new(
            self.sink.dialect(),
            TransformOptions {
                case_conversion: self.options.case_conversion,
            },
        )
    }
}
