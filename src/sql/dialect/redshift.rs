//! Amazon Redshift dialect.
//!
//! Redshift is Postgres-based but has notable differences:
//! - No MERGE statement in the supported baseline
//! - Only VARCHAR columns can be resized in place
//! - Nullability of an existing column cannot change

use super::helpers;
use super::SqlDialect;
use crate::sql::types::DataType;

/// Amazon Redshift dialect.
#[derive(Debug, Clone, Copy)]
pub struct Redshift;

impl SqlDialect for Redshift {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_redshift(dt)
    }

    fn supports_alter_column_type(&self) -> bool {
        false
    }

    fn supports_data_sizing_changes(&self) -> bool {
        true
    }

    fn supports_drop_not_null(&self) -> bool {
        false
    }

    fn alter_column_type_clause(&self) -> &'static str {
        "TYPE"
    }
}
