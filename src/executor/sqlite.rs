//! Embedded SQLite executor.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, warn};

use super::{substitute_placeholders, Executor, ExecutorError, ExecutorResult, Placeholders, Row};
use crate::dataset::Dataset;
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::types::DataType;
use crate::transformer::SqlPlan;

/// Runs plans on a rusqlite connection. Dataset groups name attached databases.
pub struct SqliteExecutor {
    conn: Option<Connection>,
}

impl SqliteExecutor {
    pub fn open(path: impl AsRef<Path>) -> ExecutorResult<Self> {
        Ok(Self::new(Connection::open(path)?))
    }

    pub fn open_in_memory() -> ExecutorResult<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    pub fn new(conn: Connection) -> Self {
        Self { conn: Some(conn) }
    }

    fn conn(&self) -> ExecutorResult<&Connection> {
        self.conn.as_ref().ok_or(ExecutorError::Closed)
    }

    /// Run one or more raw statements.
    pub fn execute_batch(&self, sql: &str) -> ExecutorResult<()> {
        self.conn()?.execute_batch(sql).map_err(|e| statement_error(sql, e))
    }

    /// Run a query and collect its rows.
    pub fn query(&self, sql: &str) -> ExecutorResult<Vec<Row>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(|e| statement_error(sql, e))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, column) in columns.iter().enumerate() {
                record.insert(column.clone(), to_json(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(out)
    }

    /// `(name, declared type)` for every column of a table.
    fn table_columns(&self, dataset: &Dataset) -> ExecutorResult<Vec<(String, String)>> {
        let sql = format!("PRAGMA {}table_info({})", schema_prefix(dataset), quote(dataset.name()));
        Ok(self
            .query(&sql)?
            .into_iter()
            .map(|row| {
                let text = |key: &str| row.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
                (text("name"), text("type"))
            })
            .collect())
    }
}

impl Executor for SqliteExecutor {
    fn dataset_exists(&mut self, dataset: &Dataset) -> ExecutorResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {}sqlite_master WHERE type = 'table' AND lower(name) = lower({})",
            schema_prefix(dataset),
            Dialect::Sqlite.quote_string(dataset.name())
        );
        let rows = self.query(&sql)?;
        Ok(super::scalar(&[rows]).and_then(Value::as_i64).unwrap_or(0) > 0)
    }

    fn execute_physical_plan(
        &mut self,
        plan: &SqlPlan,
        placeholders: &Placeholders,
    ) -> ExecutorResult<()> {
        for statement in plan {
            let sql = substitute_placeholders(statement, placeholders);
            debug!(sql = %sql, "execute");
            self.execute_batch(&sql)?;
        }
        Ok(())
    }

    fn execute_physical_plan_and_get_results(
        &mut self,
        plan: &SqlPlan,
        placeholders: &Placeholders,
    ) -> ExecutorResult<Vec<Vec<Row>>> {
        plan.statements()
            .iter()
            .map(|statement| {
                let sql = substitute_placeholders(statement, placeholders);
                debug!(sql = %sql, "query");
                self.query(&sql)
            })
            .collect()
    }

    fn validate_main_dataset_schema(&mut self, dataset: &Dataset) -> ExecutorResult<()> {
        let live = self.table_columns(dataset)?;
        let mismatch = |detail: String| ExecutorError::SchemaMismatch {
            dataset: dataset.name().to_string(),
            detail,
        };
        for field in &dataset.schema.fields {
            let Some((_, live_type)) = live.iter().find(|(name, _)| name.eq_ignore_ascii_case(&field.name))
            else {
                return Err(mismatch(format!("column '{}' is missing", field.name)));
            };
            // Undeclared or unknown live types carry no affinity worth checking
            if let Some(live_type) = DataType::parse(live_type) {
                if live_type.family() != field.data_type.family() {
                    return Err(mismatch(format!(
                        "column '{}' is {} but declared {}",
                        field.name, live_type, field.data_type
                    )));
                }
            }
        }
        Ok(())
    }

    fn begin(&mut self) -> ExecutorResult<()> {
        self.execute_batch("BEGIN")
    }

    fn commit(&mut self) -> ExecutorResult<()> {
        self.execute_batch("COMMIT")
    }

    fn revert(&mut self) -> ExecutorResult<()> {
        if self.conn()?.is_autocommit() {
            return Ok(());
        }
        self.execute_batch("ROLLBACK")
    }

    fn close(&mut self) -> ExecutorResult<()> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| ExecutorError::from(e)),
            None => {
                warn!("close called on a closed connection");
                Ok(())
            }
        }
    }
}

fn quote(ident: &str) -> String {
    Dialect::Sqlite.quote_identifier(ident)
}

fn schema_prefix(dataset: &Dataset) -> String {
    dataset
        .group()
        .map(|group| format!("{}.", quote(&group)))
        .unwrap_or_default()
}

fn statement_error(sql: &str, e: rusqlite::Error) -> ExecutorError {
    ExecutorError::Statement {
        sql: sql.to_string(),
        message: e.to_string(),
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}
