//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use crate::sql::types::DataType;

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: ANSI, H2, Snowflake, Redshift, SQLite
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: BigQuery, Databricks, Spanner
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

// =============================================================================
// Literal Formatting
// =============================================================================

/// Format boolean as literal true/false.
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: SQLite
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

/// Timestamp literal parsed into a BigQuery DATETIME.
pub fn format_timestamp_bigquery(ts: &str) -> String {
    format!("PARSE_DATETIME('%Y-%m-%d %H:%M:%S','{}')", ts.replace('\'', "''"))
}

// =============================================================================
// Data Type Emission
// =============================================================================

/// Emit data type for ANSI style.
/// Used by: ANSI, H2
pub fn emit_data_type_ansi(dt: &DataType) -> String {
    match dt {
        DataType::Bool => "BOOLEAN".into(),
        DataType::Int8 => "TINYINT".into(),
        DataType::Int16 => "SMALLINT".into(),
        DataType::Int32 => "INTEGER".into(),
        DataType::Int64 => "BIGINT".into(),
        DataType::Float32 => "REAL".into(),
        DataType::Float64 => "DOUBLE PRECISION".into(),
        DataType::Decimal(p, s) => format!("DECIMAL({},{})", p, s),
        DataType::String => "VARCHAR".into(),
        DataType::Char(n) => format!("CHAR({})", n),
        DataType::Varchar(n) => format!("VARCHAR({})", n),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp => "TIMESTAMP".into(),
        DataType::TimestampTz => "TIMESTAMP WITH TIME ZONE".into(),
        DataType::Binary => "VARBINARY".into(),
        DataType::Json => "JSON".into(),
    }
}

/// Emit data type for Snowflake.
pub fn emit_data_type_snowflake(dt: &DataType) -> String {
    match dt {
        DataType::Float32 | DataType::Float64 => "DOUBLE".into(),
        DataType::Decimal(p, s) => format!("NUMBER({},{})", p, s),
        DataType::Timestamp => "DATETIME".into(),
        DataType::TimestampTz => "TIMESTAMP_TZ".into(),
        DataType::Binary => "BINARY".into(),
        DataType::Json => "VARIANT".into(),
        other => emit_data_type_ansi(other),
    }
}

/// Emit data type for BigQuery.
pub fn emit_data_type_bigquery(dt: &DataType) -> String {
    match dt {
        DataType::Bool => "BOOL".into(),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => "INT64".into(),
        DataType::Float32 | DataType::Float64 => "FLOAT64".into(),
        DataType::Decimal(p, s) => format!("NUMERIC({},{})", p, s),
        DataType::String => "STRING".into(),
        DataType::Char(n) | DataType::Varchar(n) => format!("STRING({})", n),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp => "DATETIME".into(),
        DataType::TimestampTz => "TIMESTAMP".into(),
        DataType::Binary => "BYTES".into(),
        DataType::Json => "JSON".into(),
    }
}

/// Emit data type for Databricks (Spark SQL).
pub fn emit_data_type_databricks(dt: &DataType) -> String {
    match dt {
        DataType::Int32 => "INT".into(),
        DataType::Float32 => "FLOAT".into(),
        DataType::Float64 => "DOUBLE".into(),
        DataType::String | DataType::Char(_) | DataType::Varchar(_) | DataType::Json => {
            "STRING".into()
        }
        DataType::Time | DataType::Timestamp => "TIMESTAMP_NTZ".into(),
        DataType::TimestampTz => "TIMESTAMP".into(),
        DataType::Binary => "BINARY".into(),
        other => emit_data_type_ansi(other),
    }
}

/// Emit data type for Redshift.
pub fn emit_data_type_redshift(dt: &DataType) -> String {
    match dt {
        DataType::Int8 => "SMALLINT".into(),
        DataType::String => "VARCHAR(65535)".into(),
        DataType::TimestampTz => "TIMESTAMPTZ".into(),
        DataType::Binary => "VARBYTE".into(),
        DataType::Json => "SUPER".into(),
        other => emit_data_type_ansi(other),
    }
}

/// Emit data type for Spanner.
pub fn emit_data_type_spanner(dt: &DataType) -> String {
    match dt {
        DataType::Bool => "BOOL".into(),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => "INT64".into(),
        DataType::Float32 | DataType::Float64 => "FLOAT64".into(),
        DataType::Decimal(_, _) => "NUMERIC".into(),
        DataType::String => "STRING(MAX)".into(),
        DataType::Char(n) | DataType::Varchar(n) => format!("STRING({})", n),
        DataType::Date => "DATE".into(),
        DataType::Time | DataType::Timestamp | DataType::TimestampTz => "TIMESTAMP".into(),
        DataType::Binary => "BYTES(MAX)".into(),
        DataType::Json => "JSON".into(),
    }
}

/// Emit data type for SQLite.
///
/// 64-bit integers render as `BIGINT`, which SQLite never treats as a
/// rowid alias.
pub fn emit_data_type_sqlite(dt: &DataType) -> String {
    match dt {
        DataType::Bool => "BOOLEAN".into(),
        DataType::Int8 | DataType::Int16 | DataType::Int32 => "INTEGER".into(),
        DataType::Int64 => "BIGINT".into(),
        DataType::Float32 => "REAL".into(),
        DataType::Float64 => "DOUBLE".into(),
        DataType::Decimal(p, s) => format!("DECIMAL({},{})", p, s),
        DataType::String | DataType::Json => "TEXT".into(),
        DataType::Char(n) => format!("CHAR({})", n),
        DataType::Varchar(n) => format!("VARCHAR({})", n),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp | DataType::TimestampTz => "DATETIME".into(),
        DataType::Binary => "BLOB".into(),
    }
}
