//! Databricks (Spark SQL) dialect.
//!
//! Databricks features:
//! - Backtick identifier quoting
//! - MERGE INTO on Delta tables
//! - ALTER COLUMN ... TYPE for type widening

use super::helpers;
use super::SqlDialect;
use crate::sql::types::DataType;

/// Databricks (Spark SQL) dialect.
#[derive(Debug, Clone, Copy)]
pub struct Databricks;

impl SqlDialect for Databricks {
    fn name(&self) -> &'static str {
        "databricks"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_databricks(dt)
    }

    fn alter_column_type_clause(&self) -> &'static str {
        "TYPE"
    }

    fn supports_merge(&self) -> bool {
        true
    }
}
