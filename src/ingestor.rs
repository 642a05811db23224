//! Ingestor - run one ingest against a live connection.
//!
//! ```text
//! import external staging ─► count staging ─► validate live main
//!   BEGIN ─► pre-actions ─► schema evolution
//!     per split: resolve batch id ─► pre stats ─► ingest ─► post stats ─► metadata row
//!   post-actions ─► COMMIT
//! ```
//!
//! Any failure rolls the transaction back, closes the executor and returns
//! the original error. The executor is closed after every call.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dataset::Datasets;
use crate::error::{IngestError, IngestResult};
use crate::executor::{scalar, Executor, Placeholders};
use crate::generator::{GeneratorOptions, GeneratorResult, RelationalGenerator};
use crate::importer::{DigestInfo, Importer, JsonRowsImporter};
use crate::ingest_mode::IngestMode;
use crate::logical_plan::LogicalPlan;
use crate::planner::{
    create_table, staging_with_import_digest, DataSplitRange, StatisticName,
    NEXT_BATCH_ID_PLACEHOLDER,
};
use crate::sql::dml::Delete;
use crate::transformer::{RelationalTransformer, Sink, SqlPlan, TransformOptions};

/// Outcome of one ingest pass.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestorResult {
    /// Batch id stamped by this pass, for batch-id milestoning.
    pub batch_id: Option<i64>,
    pub data_split_range: Option<DataSplitRange>,
    pub statistics: BTreeMap<StatisticName, i64>,
    /// Datasets after import and schema evolution.
    pub updated_datasets: Datasets,
    pub schema_evolution_sql: Option<SqlPlan>,
    pub batch_start_timestamp: String,
}

/// Runs the SQL of a [`RelationalGenerator`] through an [`Executor`].
///
/// Batch ids are read then written without a lock; ingests into the same
/// main table must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct RelationalIngestor {
    generator: RelationalGenerator,
}

impl RelationalIngestor {
    pub fn new(mode: IngestMode, sink: Sink, options: GeneratorOptions) -> Self {
        Self {
            generator: RelationalGenerator::new(mode, sink, options),
        }
    }

    pub fn generator(&self) -> &RelationalGenerator {
        &self.generator
    }

    pub fn ingest(
        &self,
        executor: &mut dyn Executor,
        datasets: &Datasets,
    ) -> IngestResult<IngestorResult> {
        self.guarded(executor, datasets, &[])?
            .pop()
            .ok_or(IngestError::NoPass)
    }

    /// One pass per range inside a single transaction, each with its own batch id.
    ///
    /// With no ranges this is a plain [`ingest`](Self::ingest).
    pub fn ingest_with_data_splits(
        &self,
        executor: &mut dyn Executor,
        datasets: &Datasets,
        ranges: &[DataSplitRange],
    ) -> IngestResult<Vec<IngestorResult>> {
        self.guarded(executor, datasets, ranges)
    }

    fn guarded(
        &self,
        executor: &mut dyn Executor,
        datasets: &Datasets,
        ranges: &[DataSplitRange],
    ) -> IngestResult<Vec<IngestorResult>> {
        let outcome = self.run(executor, datasets, ranges);
        if let Err(err) = &outcome {
            warn!(error = %err, "ingest failed, rolling back");
            if let Err(revert) = executor.revert() {
                warn!(error = %revert, "rollback failed");
            }
        }
        if let Err(close) = executor.close() {
            warn!(error = %close, "close failed");
        }
        outcome
    }

    fn run(
        &self,
        executor: &mut dyn Executor,
        datasets: &Datasets,
        ranges: &[DataSplitRange],
    ) -> IngestResult<Vec<IngestorResult>> {
        let mode = self.generator.mode();
        info!(
            mode = mode.name(),
            main = datasets.main.name(),
            splits = ranges.len(),
            "starting ingest"
        );

        let mut datasets = datasets.clone();
        if datasets.staging.is_external() {
            datasets = self.import_staging(executor, &datasets)?;
        }

        let staging_empty = executor.dataset_exists(&datasets.staging)? && {
            let count = self.generator.generate_staging_count(&datasets)?;
            let rows = executor.execute_physical_plan_and_get_results(&count, &Placeholders::new())?;
            scalar(&rows).and_then(Value::as_i64) == Some(0)
        };

        if !datasets.main.schema.is_empty() && executor.dataset_exists(&datasets.main)? {
            executor.validate_main_dataset_schema(&datasets.main)?;
        }

        let generated: Vec<(GeneratorResult, Option<DataSplitRange>)> = if staging_empty {
            debug!("staging is empty");
            vec![(self.generator.generate_operations_for_empty_batch(&datasets)?, None)]
        } else if ranges.is_empty() {
            vec![(self.generator.generate_operations(&datasets)?, None)]
        } else {
            self.generator
                .generate_operations_with_data_splits(&datasets, ranges)?
                .into_iter()
                .zip(ranges.iter().copied().map(Some))
                .collect()
        };
        let Some((first, _)) = generated.first() else {
            return Ok(Vec::new());
        };

        if let Some(evolved) = first.schema_evolution_dataset() {
            datasets = datasets.with_main_dataset(evolved.clone());
        }

        executor.begin()?;
        executor.execute_physical_plan(first.pre_actions_sql_plan(), &Placeholders::new())?;
        if let Some(evolution) = first.schema_evolution_sql_plan() {
            info!(statements = evolution.len(), "applying schema evolution");
            executor.execute_physical_plan(evolution, &Placeholders::new())?;
        }

        let mut results = Vec::with_capacity(generated.len());
        for (result, range) in &generated {
            let mut placeholders = range.map(|r| r.placeholders()).unwrap_or_default();
            let batch_id = match result.next_batch_id_sql_plan() {
                Some(plan) => {
                    let rows = executor.execute_physical_plan_and_get_results(plan, &Placeholders::new())?;
                    let batch_id = scalar(&rows)
                        .and_then(Value::as_i64)
                        .ok_or_else(|| IngestError::InvalidBatchId(format!("{:?}", scalar(&rows))))?;
                    debug!(batch_id, "resolved next batch id");
                    placeholders.insert(NEXT_BATCH_ID_PLACEHOLDER.to_string(), batch_id.to_string());
                    Some(batch_id)
                }
                None => None,
            };

            let mut statistics =
                collect_statistics(executor, result.pre_ingest_statistics_sql_plan(), &placeholders)?;
            executor.execute_physical_plan(result.ingest_sql_plan(), &placeholders)?;
            statistics.extend(collect_statistics(
                executor,
                result.post_ingest_statistics_sql_plan(),
                &placeholders,
            )?);
            executor.execute_physical_plan(result.metadata_ingest_sql_plan(), &placeholders)?;

            results.push(IngestorResult {
                batch_id,
                data_split_range: *range,
                statistics,
                updated_datasets: datasets.clone(),
                schema_evolution_sql: result.schema_evolution_sql_plan().cloned(),
                batch_start_timestamp: result.batch_start_timestamp().to_string(),
            });
        }

        executor.execute_physical_plan(first.post_actions_sql_plan(), &Placeholders::new())?;
        executor.commit()?;
        info!(passes = results.len(), "ingest committed");
        Ok(results)
    }

    /// Create and fill the staging table of an external dataset.
    fn import_staging(
        &self,
        executor: &mut dyn Executor,
        datasets: &Datasets,
    ) -> IngestResult<Datasets> {
        let mode = self.generator.mode();
        let staging = staging_with_import_digest(&datasets.staging, mode);
        let digest = DigestInfo {
            populate_digest: staging.schema.fields.len() > datasets.staging.schema.fields.len(),
            digest_field: mode.digest_field().map(str::to_string),
            meta_fields: mode.data_split_field().map(str::to_string).into_iter().collect(),
        };

        let transformer = RelationalTransformer::new(
            self.generator.sink().dialect(),
            TransformOptions {
                case_conversion: self.generator.options().case_conversion,
            },
        );
        // No key constraint, since a key may repeat across data splits. Rows
        // left behind by a rolled-back ingest are cleared before the import.
        let prepare = LogicalPlan::of(create_table(&staging).primary_key(Vec::<String>::new()))
            .then(Delete::from(staging.name()).schema(staging.group()));
        executor.execute_physical_plan(&transformer.generate_physical_plan(&prepare), &Placeholders::new())?;
        JsonRowsImporter::new(transformer).import_data(executor, &staging, &digest)?;

        Ok(datasets.with_staging_dataset(staging.materialized()))
    }
}

fn collect_statistics(
    executor: &mut dyn Executor,
    plans: &BTreeMap<StatisticName, SqlPlan>,
    placeholders: &Placeholders,
) -> IngestResult<BTreeMap<StatisticName, i64>> {
    plans
        .iter()
        .map(|(name, plan)| {
            let rows = executor.execute_physical_plan_and_get_results(plan, placeholders)?;
            let value = scalar(&rows).and_then(Value::as_i64).ok_or_else(|| {
                IngestError::InvalidStatistic {
                    statistic: *name,
                    value: format!("{:?}", scalar(&rows)),
                }
            })?;
            Ok((*name, value))
        })
        .collect()
}
