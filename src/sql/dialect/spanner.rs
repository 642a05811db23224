//! Cloud Spanner (GoogleSQL) dialect.
//!
//! Spanner features:
//! - Backtick identifier quoting
//! - ALTER COLUMN restates the full column type
//! - No MERGE statement

use super::helpers;
use super::SqlDialect;
use crate::sql::types::DataType;

/// Cloud Spanner dialect.
#[derive(Debug, Clone, Copy)]
pub struct Spanner;

impl SqlDialect for Spanner {
    fn name(&self) -> &'static str {
        "spanner"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_spanner(dt)
    }

    fn supports_drop_not_null(&self) -> bool {
        false
    }

    fn alter_column_type_clause(&self) -> &'static str {
        ""
    }
}
