//! Shared fixtures for the ingest tests: a throwaway SQLite file and
//! external staging built from JSON rows.

#![allow(dead_code)]

use std::path::PathBuf;

use milestone::dataset::{Dataset, Datasets, ExternalSource, Field};
use milestone::error::IngestResult;
use milestone::executor::SqliteExecutor;
use milestone::generator::GeneratorOptions;
use milestone::ingest_mode::IngestMode;
use milestone::ingestor::{IngestorResult, RelationalIngestor};
use milestone::planner::DataSplitRange;
use milestone::sql::Dialect;
use milestone::transformer::Sink;
use serde_json::Value;

/// A SQLite database file removed on drop.
///
/// The ingestor closes its executor after every call, so each pass opens
/// a fresh connection to the same file.
pub struct TestDb {
    path: PathBuf,
}

impl TestDb {
    pub fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "milestone_{}_{}.db",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        Self { path }
    }

    pub fn executor(&self) -> SqliteExecutor {
        SqliteExecutor::open(&self.path).unwrap()
    }

    /// Rows of `sql` as a JSON array of objects.
    pub fn select(&self, sql: &str) -> Value {
        let rows = self.executor().query(sql).unwrap();
        Value::Array(rows.into_iter().map(Value::Object).collect())
    }

    pub fn count(&self, table: &str) -> i64 {
        self.select(&format!("SELECT COUNT(*) AS n FROM \"{}\"", table))[0]["n"]
            .as_i64()
            .unwrap()
    }

    pub fn ingest(
        &self,
        mode: &IngestMode,
        batch_start: &str,
        datasets: &Datasets,
    ) -> IngestResult<IngestorResult> {
        ingestor(mode, options(batch_start)).ingest(&mut self.executor(), datasets)
    }

    pub fn ingest_with_options(
        &self,
        mode: &IngestMode,
        options: GeneratorOptions,
        datasets: &Datasets,
    ) -> IngestResult<IngestorResult> {
        ingestor(mode, options).ingest(&mut self.executor(), datasets)
    }

    pub fn ingest_splits(
        &self,
        mode: &IngestMode,
        batch_start: &str,
        datasets: &Datasets,
        ranges: &[DataSplitRange],
    ) -> IngestResult<Vec<IngestorResult>> {
        ingestor(mode, options(batch_start)).ingest_with_data_splits(
            &mut self.executor(),
            datasets,
            ranges,
        )
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn options(batch_start: &str) -> GeneratorOptions {
    GeneratorOptions::default()
        .collect_statistics(true)
        .batch_start_timestamp(batch_start)
}

fn ingestor(mode: &IngestMode, options: GeneratorOptions) -> RelationalIngestor {
    RelationalIngestor::new(mode.clone(), Sink::new("sqlite", Dialect::Sqlite), options)
}

/// Main (schema derived on first use) fed by external staging holding `rows`.
pub fn datasets(fields: &[Field], rows: Value) -> Datasets {
    Datasets::new(Dataset::definition("main", vec![]), staging(fields, rows))
}

pub fn staging(fields: &[Field], rows: Value) -> Dataset {
    staging_named("staging", fields, rows)
}

pub fn staging_named(name: &str, fields: &[Field], rows: Value) -> Dataset {
    let rows = serde_json::from_value(rows).unwrap();
    Dataset::external(name, fields.to_vec(), ExternalSource::Rows(rows))
}
