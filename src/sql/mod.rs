//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect SQL.
//! It includes:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`ddl`] - Data Definition Language (CREATE, ALTER, DROP)
//! - [`dml`] - Data Manipulation Language (INSERT, UPDATE, DELETE, MERGE)
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations
//! - [`types`] - Column data types

pub mod ddl;
pub mod dialect;
pub mod dml;
pub mod expr;
pub mod query;
pub mod token;
pub mod types;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    and_all, coalesce, col, count_star, current_timestamp, exists, func, lit_bool, lit_float,
    lit_int, lit_null, lit_str, lit_timestamp, max, min, not_exists, or_all, placeholder, star,
    table_col, table_star, upper, BinaryOperator, Expr, ExprExt, Literal, UnaryOperator,
};
pub use query::{Join, JoinType, Query, SelectExpr, TableRef, TableSource};
pub use token::{Token, TokenStream};
pub use types::{DataType, TypeFamily};

// Re-export DDL types
pub use ddl::{AlterAction, AlterTable, ColumnDef, CreateTable, DdlStatement, DropTable};

// Re-export DML types
pub use dml::{Delete, Insert, Merge, MergeAction, MergeSource, Update, WhenClause};
