//! SQLite dialect.
//!
//! Used by the embedded executor. SQLite has no MERGE, and ALTER TABLE
//! only supports adding columns.

use super::helpers;
use super::SqlDialect;
use crate::sql::types::DataType;

/// SQLite dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_sqlite(dt)
    }

    fn supports_alter_column_type(&self) -> bool {
        false
    }

    fn supports_drop_not_null(&self) -> bool {
        false
    }
}
