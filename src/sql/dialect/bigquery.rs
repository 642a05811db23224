//! Google BigQuery SQL dialect.
//!
//! BigQuery features:
//! - Backtick identifier quoting
//! - MERGE support
//! - DATETIME literals built with PARSE_DATETIME
//! - INT64 / FLOAT64 / STRING(n) column types

use super::helpers;
use super::SqlDialect;
use crate::sql::types::DataType;

/// Google BigQuery SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct BigQuery;

impl SqlDialect for BigQuery {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn format_timestamp_literal(&self, ts: &str) -> String {
        helpers::format_timestamp_bigquery(ts)
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_DATETIME()"
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_bigquery(dt)
    }

    fn supports_merge(&self) -> bool {
        true
    }
}
