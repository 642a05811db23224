//! Executors run generated SQL against a live connection.
//!
//! The core never opens connections itself; an [`Executor`] is handed to the
//! ingestor, which borrows it for one ingest. Statements arrive as rendered
//! [`SqlPlan`]s plus a placeholder map that is substituted textually just
//! before execution.

mod sqlite;

pub use sqlite::SqliteExecutor;

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::dataset::Dataset;
use crate::transformer::SqlPlan;

/// One result row keyed by column name.
pub type Row = Map<String, Value>;

/// Placeholder token to replacement text.
pub type Placeholders = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("statement failed: {message}\n{sql}")]
    Statement { sql: String, message: String },

    #[error("main dataset '{dataset}' does not match the live table: {detail}")]
    SchemaMismatch { dataset: String, detail: String },

    #[error("connection is closed")]
    Closed,
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// A synchronous connection the ingestor drives.
pub trait Executor {
    fn dataset_exists(&mut self, dataset: &Dataset) -> ExecutorResult<bool>;

    /// Run every statement of `plan` in order.
    fn execute_physical_plan(
        &mut self,
        plan: &SqlPlan,
        placeholders: &Placeholders,
    ) -> ExecutorResult<()>;

    /// Run every statement of `plan`, returning one result set per statement.
    fn execute_physical_plan_and_get_results(
        &mut self,
        plan: &SqlPlan,
        placeholders: &Placeholders,
    ) -> ExecutorResult<Vec<Vec<Row>>>;

    /// Fail when the live main table lacks a declared column or disagrees on its type.
    fn validate_main_dataset_schema(&mut self, dataset: &Dataset) -> ExecutorResult<()>;

    fn begin(&mut self) -> ExecutorResult<()>;

    fn commit(&mut self) -> ExecutorResult<()>;

    /// Roll back the open transaction, if any.
    fn revert(&mut self) -> ExecutorResult<()>;

    fn close(&mut self) -> ExecutorResult<()>;
}

/// Replace every placeholder token in `sql`.
///
/// Tokens are brace-delimited, so replacement order does not matter.
pub fn substitute_placeholders(sql: &str, placeholders: &Placeholders) -> String {
    placeholders
        .iter()
        .fold(sql.to_string(), |sql, (token, value)| sql.replace(token.as_str(), value))
}

/// The first column of the first row of a single-value result.
pub fn scalar(results: &[Vec<Row>]) -> Option<&Value> {
    results
        .first()
        .and_then(|rows| rows.first())
        .and_then(|row| row.values().next())
}
