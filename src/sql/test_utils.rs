//! Parse generated statements with sqlparser-rs.
//!
//! Ingestion statements carry placeholder tokens the executor fills in at
//! run time; [`validate_sql`] substitutes sample values first so the text
//! handed to the parser is what a sink would actually receive.

use sqlparser::dialect::{
    AnsiDialect, BigQueryDialect, DatabricksDialect, GenericDialect, RedshiftSqlDialect,
    SQLiteDialect, SnowflakeDialect,
};
use sqlparser::parser::Parser;

use super::dialect::Dialect;
use crate::planner::{
    DATA_SPLIT_LOWER_BOUND_PLACEHOLDER, DATA_SPLIT_UPPER_BOUND_PLACEHOLDER,
    NEXT_BATCH_ID_PLACEHOLDER,
};

/// Sample values for every placeholder the planner emits.
const SAMPLE_VALUES: [(&str, &str); 3] = [
    (NEXT_BATCH_ID_PLACEHOLDER, "1"),
    (DATA_SPLIT_LOWER_BOUND_PLACEHOLDER, "1"),
    (DATA_SPLIT_UPPER_BOUND_PLACEHOLDER, "2"),
];

fn parser_dialect(dialect: Dialect) -> Box<dyn sqlparser::dialect::Dialect> {
    match dialect {
        Dialect::Ansi => Box::new(AnsiDialect {}),
        Dialect::Snowflake => Box::new(SnowflakeDialect {}),
        Dialect::BigQuery => Box::new(BigQueryDialect {}),
        Dialect::Databricks => Box::new(DatabricksDialect {}),
        Dialect::Redshift => Box::new(RedshiftSqlDialect {}),
        Dialect::Sqlite => Box::new(SQLiteDialect {}),
        // sqlparser has no H2 or Spanner dialect
        Dialect::H2 | Dialect::Spanner => Box::new(GenericDialect {}),
    }
}

/// Fails when `sql`, with placeholders filled in, does not parse for `dialect`.
pub fn validate_sql(sql: &str, dialect: Dialect) -> Result<(), String> {
    let sql = SAMPLE_VALUES
        .iter()
        .fold(sql.to_string(), |sql, (token, value)| sql.replace(token, value));

    Parser::parse_sql(&*parser_dialect(dialect), &sql)
        .map(|_| ())
        .map_err(|e| format!("Invalid SQL for {:?}: {}\nSQL: {}", dialect, e, sql))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_sql() {
        validate_sql("DELETE FROM staging", Dialect::Ansi).unwrap();
        validate_sql("SELECT * FROM `staging`", Dialect::BigQuery).unwrap();
    }

    #[test]
    fn test_placeholders_are_filled_before_parsing() {
        validate_sql(
            "UPDATE main SET batch_id_out = {NEXT_BATCH_ID_PATTERN} - 1 \
             WHERE split_id BETWEEN '{DATA_SPLIT_LOWER_BOUND_PLACEHOLDER}' \
             AND '{DATA_SPLIT_UPPER_BOUND_PLACEHOLDER}'",
            Dialect::Sqlite,
        )
        .unwrap();
    }

    #[test]
    fn test_validate_invalid_sql() {
        assert!(validate_sql("DELET FROM staging", Dialect::Ansi).is_err());
    }
}
