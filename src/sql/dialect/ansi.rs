//! ANSI SQL dialect - base reference implementation.
//!
//! Relies entirely on the trait defaults. Used when no specific warehouse
//! is targeted and as the baseline in generated-SQL tests.

use super::helpers;
use super::SqlDialect;

/// ANSI SQL dialect (reference implementation).
#[derive(Debug, Clone, Copy)]
pub struct Ansi;

impl SqlDialect for Ansi {
    fn name(&self) -> &'static str {
        "ansi"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }
}
