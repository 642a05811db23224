//! H2 dialect.
//!
//! H2 features:
//! - ANSI identifier quoting (`"`)
//! - MERGE INTO ... USING support
//! - ALTER COLUMN ... SET DATA TYPE and DROP NOT NULL

use super::helpers;
use super::SqlDialect;

/// H2 dialect.
#[derive(Debug, Clone, Copy)]
pub struct H2;

impl SqlDialect for H2 {
    fn name(&self) -> &'static str {
        "h2"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn supports_merge(&self) -> bool {
        true
    }
}
