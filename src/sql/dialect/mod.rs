//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for the warehouse engines
//! ingestion statements are rendered for. Each dialect implements
//! `SqlDialect` to handle its specific syntax and capabilities:
//!
//! - Identifier quoting: `"` (ANSI/H2/Snowflake/Redshift/SQLite), `` ` `` (BigQuery/Databricks/Spanner)
//! - Boolean literals: true/false vs 1/0
//! - Timestamp literals and the current-timestamp expression
//! - Column type names
//! - Statement capabilities: native MERGE, ALTER TABLE variants
//!
//! # Capability Matrix
//!
//! | Capability | ANSI | H2 | Snowflake | BigQuery | Databricks | Redshift | Spanner | SQLite |
//! |------------|------|----|-----------|----------|------------|----------|---------|--------|
//! | MERGE | ❌ | ✓ | ✓ | ✓ | ✓ | ❌ | ❌ | ❌ |
//! | ADD COLUMN | ✓ | ✓ | ✓ | ✓ | ✓ | ✓ | ✓ | ✓ |
//! | Change column type | ✓ | ✓ | ✓ | ✓ | ✓ | ❌ | ✓ | ❌ |
//! | Resize column | ✓ | ✓ | ✓ | ✓ | ✓ | ✓ | ✓ | ❌ |
//! | Drop NOT NULL | ✓ | ✓ | ✓ | ✓ | ✓ | ❌ | ❌ | ❌ |
//! | IF NOT EXISTS | ✓ | ✓ | ✓ | ✓ | ✓ | ✓ | ✓ | ✓ |
//!
//! Dialects without MERGE get the same semantics through separate
//! UPDATE, DELETE and INSERT statements.

mod ansi;
mod bigquery;
mod databricks;
mod h2;
pub mod helpers;
mod redshift;
mod snowflake;
mod spanner;
mod sqlite;

pub use ansi::Ansi;
pub use bigquery::BigQuery;
pub use databricks::Databricks;
pub use h2::H2;
pub use redshift::Redshift;
pub use snowflake::Snowflake;
pub use spanner::Spanner;
pub use sqlite::Sqlite;

use super::types::DataType;

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal with `''` escaping.
    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    /// Format a NULL literal.
    fn format_null(&self) -> &'static str {
        "NULL"
    }

    // =========================================================================
    // Date/Time
    // =========================================================================

    /// Format a `YYYY-MM-DD HH:MM:SS` timestamp literal.
    ///
    /// Most engines coerce the quoted string on comparison and insert.
    fn format_timestamp_literal(&self, ts: &str) -> String {
        self.quote_string(ts)
    }

    /// Expression for the engine's current timestamp.
    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    // =========================================================================
    // DDL Support
    // =========================================================================

    /// Emit a column type for this dialect.
    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_ansi(dt)
    }

    /// Whether this dialect supports IF NOT EXISTS for CREATE statements.
    fn supports_if_not_exists(&self) -> bool {
        true
    }

    /// Whether this dialect supports IF EXISTS for DROP statements.
    fn supports_if_exists(&self) -> bool {
        true
    }

    /// Whether ALTER TABLE ... ADD COLUMN is available.
    fn supports_add_column(&self) -> bool {
        true
    }

    /// Whether a column's type can be changed in place.
    fn supports_alter_column_type(&self) -> bool {
        true
    }

    /// Whether a column's length, precision or scale can grow in place.
    fn supports_data_sizing_changes(&self) -> bool {
        self.supports_alter_column_type()
    }

    /// Whether a NOT NULL constraint can be dropped from an existing column.
    fn supports_drop_not_null(&self) -> bool {
        true
    }

    /// Keyword sequence between the column name and the new type in
    /// `ALTER TABLE t ALTER COLUMN c <clause> <type>`.
    fn alter_column_type_clause(&self) -> &'static str {
        "SET DATA TYPE"
    }

    // =========================================================================
    // DML Support
    // =========================================================================

    /// Whether this dialect supports the native MERGE statement.
    ///
    /// Callers lower merges to UPDATE/DELETE/INSERT when this is false.
    fn supports_merge(&self) -> bool {
        false
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    Ansi,
    H2,
    Snowflake,
    BigQuery,
    Databricks,
    Redshift,
    Spanner,
    Sqlite,
}

impl Dialect {
    /// Every dialect, in display order.
    pub const ALL: [Dialect; 8] = [
        Dialect::Ansi,
        Dialect::H2,
        Dialect::Snowflake,
        Dialect::BigQuery,
        Dialect::Databricks,
        Dialect::Redshift,
        Dialect::Spanner,
        Dialect::Sqlite,
    ];

    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Ansi => &Ansi,
            Dialect::H2 => &H2,
            Dialect::Snowflake => &Snowflake,
            Dialect::BigQuery => &BigQuery,
            Dialect::Databricks => &Databricks,
            Dialect::Redshift => &Redshift,
            Dialect::Spanner => &Spanner,
            Dialect::Sqlite => &Sqlite,
        }
    }

    /// Look a dialect up by its display name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Dialect> {
        Dialect::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(name))
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn format_null(&self) -> &'static str {
        self.dialect().format_null()
    }

    fn format_timestamp_literal(&self, ts: &str) -> String {
        self.dialect().format_timestamp_literal(ts)
    }

    fn current_timestamp(&self) -> &'static str {
        self.dialect().current_timestamp()
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        self.dialect().emit_data_type(dt)
    }

    fn supports_if_not_exists(&self) -> bool {
        self.dialect().supports_if_not_exists()
    }

    fn supports_if_exists(&self) -> bool {
        self.dialect().supports_if_exists()
    }

    fn supports_add_column(&self) -> bool {
        self.dialect().supports_add_column()
    }

    fn supports_alter_column_type(&self) -> bool {
        self.dialect().supports_alter_column_type()
    }

    fn supports_data_sizing_changes(&self) -> bool {
        self.dialect().supports_data_sizing_changes()
    }

    fn supports_drop_not_null(&self) -> bool {
        self.dialect().supports_drop_not_null()
    }

    fn alter_column_type_clause(&self) -> &'static str {
        self.dialect().alter_column_type_clause()
    }

    fn supports_merge(&self) -> bool {
        self.dialect().supports_merge()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}
