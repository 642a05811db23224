//! DML (Data Manipulation Language) support.
//!
//! This module provides types and builders for generating DML statements
//! (INSERT, UPDATE, DELETE, MERGE) across different SQL dialects.
//!
//! # Examples
//!
//! ```ignore
//! use milestone::sql::dml::{Insert, Update, Delete};
//! use milestone::sql::expr::{col, lit_int, table_col, ExprExt};
//!
//! // INSERT ... SELECT
//! let insert = Insert::into("main")
//!     .columns(["id", "name"])
//!     .from_select(Query::new().select(vec![col("id"), col("name")]).from(TableRef::new("staging")));
//!
//! // UPDATE with a target alias
//! let update = Update::table("main")
//!     .alias("sink")
//!     .set("batch_id_out", lit_int(4))
//!     .filter(table_col("sink", "batch_id_out").eq(lit_int(999999999)));
//!
//! // DELETE
//! let delete = Delete::from("staging");
//! ```

use super::dialect::Dialect;
use super::expr::{BinaryOperator, Expr, ExprExt};
use super::query::Query;
use super::token::{Token, TokenStream};

/// Push `schema.table [AS alias]`.
fn push_table(ts: &mut TokenStream, schema: &Option<String>, table: &str, alias: &Option<String>) {
    ts.push(Token::QualifiedIdent {
        schema: schema.clone(),
        name: table.to_string(),
    });
    if let Some(alias) = alias {
        ts.space()
            .push(Token::As)
            .space()
            .push(Token::Ident(alias.clone()));
    }
}

fn push_assignments(ts: &mut TokenStream, assignments: &[(String, Expr)]) {
    ts.comma_separated(assignments, |ts, (col, expr)| {
        ts.push(Token::Ident(col.clone()))
            .space()
            .push(Token::Eq)
            .space()
            .append(&expr.to_tokens());
    });
}

fn and_filter(existing: Option<Expr>, expr: Expr) -> Option<Expr> {
    Some(match existing {
        Some(existing) => existing.and(expr),
        None => expr,
    })
}

// ============================================================================
// INSERT
// ============================================================================

/// INSERT statement.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Insert {
    pub schema: Option<String>,
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Expr>>,
    pub from_query: Option<Box<Query>>,
}

impl Insert {
    /// Create a new INSERT statement.
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
            from_query: None,
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Set the columns to insert.
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Add a row of values.
    pub fn values(mut self, vals: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        self.values
            .push(vals.into_iter().map(|v| v.into()).collect());
        self
    }

    /// Add multiple rows of values.
    pub fn values_many(mut self, rows: impl IntoIterator<Item = Vec<Expr>>) -> Self {
        self.values.extend(rows);
        self
    }

    /// Insert from a SELECT query.
    pub fn from_select(mut self, query: Query) -> Self {
        self.from_query = Some(Box::new(query));
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens().serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        // INSERT INTO table
        ts.push(Token::Insert).space().push(Token::Into).space();
        push_table(&mut ts, &self.schema, &self.table, &None);

        // Columns
        if !self.columns.is_empty() {
            ts.space().lparen();
            ts.comma_separated(&self.columns, |ts, col| {
                ts.push(Token::Ident(col.clone()));
            });
            ts.rparen();
        }

        // VALUES or SELECT
        if let Some(ref query) = self.from_query {
            ts.space().append(&query.to_tokens());
        } else if !self.values.is_empty() {
            ts.space().push(Token::Values);
            for (row_idx, row) in self.values.iter().enumerate() {
                if row_idx > 0 {
                    ts.comma();
                }
                ts.space().lparen();
                ts.comma_separated(row, |ts, val| {
                    ts.append(&val.to_tokens());
                });
                ts.rparen();
            }
        }

        ts
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// UPDATE statement.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Update {
    pub schema: Option<String>,
    pub table: String,
    pub alias: Option<String>,
    pub set: Vec<(String, Expr)>,
    pub filter: Option<Expr>,
}

impl Update {
    /// Create a new UPDATE statement.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            alias: None,
            set: Vec::new(),
            filter: None,
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Alias the target table so correlated subqueries can reach it.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Set a column to a value.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.set.push((column.into(), value.into()));
        self
    }

    /// Set multiple columns.
    pub fn set_many(
        mut self,
        assignments: impl IntoIterator<Item = (impl Into<String>, impl Into<Expr>)>,
    ) -> Self {
        self.set
            .extend(assignments.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Add WHERE clause (ANDed with existing conditions).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = and_filter(self.filter, expr);
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens().serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        // UPDATE table [AS alias]
        ts.push(Token::Update).space();
        push_table(&mut ts, &self.schema, &self.table, &self.alias);

        // SET clause
        ts.space().push(Token::Set).space();
        push_assignments(&mut ts, &self.set);

        // WHERE clause
        if let Some(ref filter) = self.filter {
            ts.space()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens());
        }

        ts
    }
}

// ============================================================================
// DELETE
// ============================================================================

/// DELETE statement.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Delete {
    pub schema: Option<String>,
    pub table: String,
    pub alias: Option<String>,
    pub filter: Option<Expr>,
}

impl Delete {
    /// Create a new DELETE statement.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            alias: None,
            filter: None,
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Alias the target table.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add WHERE clause (ANDed with existing conditions).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = and_filter(self.filter, expr);
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens().serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        // DELETE FROM table [AS alias]
        ts.push(Token::Delete).space().push(Token::From).space();
        push_table(&mut ts, &self.schema, &self.table, &self.alias);

        // WHERE clause
        if let Some(ref filter) = self.filter {
            ts.space()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens());
        }

        ts
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// MERGE statement for upsert operations.
///
/// Performs INSERT, UPDATE, or DELETE in a single statement based on
/// whether rows match between source and target.
///
/// # Dialect Support
///
/// Check `dialect.supports_merge()` before rendering this statement. Sinks
/// without MERGE get separate UPDATE, DELETE and INSERT statements instead.
///
/// # Example
///
/// ```ignore
/// let merge = Merge::into("main")
///     .target_alias("sink")
///     .using_table(None, "staging")
///     .source_alias("stage")
///     .on(table_col("sink", "id").eq(table_col("stage", "id")))
///     .when_matched_and_update(
///         table_col("sink", "digest").ne(table_col("stage", "digest")),
///         [("name", table_col("stage", "name"))],
///     )
///     .when_not_matched_insert(["id", "name"], [table_col("stage", "id"), table_col("stage", "name")]);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Merge {
    pub target_schema: Option<String>,
    pub target_table: String,
    pub target_alias: Option<String>,
    pub source: MergeSource,
    pub source_alias: String,
    pub on_condition: Expr,
    pub when_clauses: Vec<WhenClause>,
}

/// Source for a MERGE statement - either a table or a subquery.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeSource {
    /// A table reference.
    Table {
        schema: Option<String>,
        name: String,
    },
    /// A subquery.
    Query(Box<Query>),
}

/// A WHEN clause in a MERGE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    /// true = WHEN MATCHED, false = WHEN NOT MATCHED
    pub matched: bool,
    /// Optional additional condition (AND ...)
    pub condition: Option<Expr>,
    /// The action to take
    pub action: MergeAction,
}

/// Action to take in a WHEN clause.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeAction {
    /// UPDATE SET column = value, ...
    Update { assignments: Vec<(String, Expr)> },
    /// DELETE
    Delete,
    /// INSERT (columns) VALUES (values)
    Insert {
        columns: Vec<String>,
        values: Vec<Expr>,
    },
}

impl Merge {
    /// Create a new MERGE statement targeting a table.
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            target_schema: None,
            target_table: table.into(),
            target_alias: None,
            source: MergeSource::Table {
                schema: None,
                name: String::new(),
            },
            source_alias: "src".into(),
            on_condition: Expr::Literal(super::expr::Literal::Bool(true)),
            when_clauses: Vec::new(),
        }
    }

    /// Set the target schema.
    pub fn target_schema(mut self, schema: Option<String>) -> Self {
        self.target_schema = schema;
        self
    }

    /// Set the target alias.
    pub fn target_alias(mut self, alias: impl Into<String>) -> Self {
        self.target_alias = Some(alias.into());
        self
    }

    /// Set the source to a table.
    pub fn using_table(mut self, schema: Option<String>, table: impl Into<String>) -> Self {
        self.source = MergeSource::Table {
            schema,
            name: table.into(),
        };
        self
    }

    /// Set the source to a subquery.
    pub fn using_query(mut self, query: Query) -> Self {
        self.source = MergeSource::Query(Box::new(query));
        self
    }

    /// Set the source alias.
    pub fn source_alias(mut self, alias: impl Into<String>) -> Self {
        self.source_alias = alias.into();
        self
    }

    /// Set the ON condition.
    pub fn on(mut self, condition: Expr) -> Self {
        self.on_condition = condition;
        self
    }

    /// Add a WHEN MATCHED AND condition THEN UPDATE clause.
    pub fn when_matched_and_update(
        self,
        condition: Expr,
        assignments: impl IntoIterator<Item = (impl Into<String>, Expr)>,
    ) -> Self {
        self.when(WhenClause {
            matched: true,
            condition: Some(condition),
            action: MergeAction::Update {
                assignments: assignments
                    .into_iter()
                    .map(|(c, e)| (c.into(), e))
                    .collect(),
            },
        })
    }

    /// Add a WHEN MATCHED AND condition THEN DELETE clause.
    pub fn when_matched_and_delete(self, condition: Expr) -> Self {
        self.when(WhenClause {
            matched: true,
            condition: Some(condition),
            action: MergeAction::Delete,
        })
    }

    /// Add a WHEN NOT MATCHED THEN INSERT clause.
    pub fn when_not_matched_insert(
        self,
        columns: impl IntoIterator<Item = impl Into<String>>,
        values: impl IntoIterator<Item = Expr>,
    ) -> Self {
        self.when(WhenClause {
            matched: false,
            condition: None,
            action: MergeAction::Insert {
                columns: columns.into_iter().map(|c| c.into()).collect(),
                values: values.into_iter().collect(),
            },
        })
    }

    /// Add a raw WHEN clause.
    pub fn when(mut self, clause: WhenClause) -> Self {
        self.when_clauses.push(clause);
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens().serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        // MERGE INTO target [AS alias]
        ts.push(Token::Merge).space().push(Token::Into).space();
        push_table(
            &mut ts,
            &self.target_schema,
            &self.target_table,
            &self.target_alias,
        );

        // USING source AS alias
        ts.space().push(Token::Using).space();

        match &self.source {
            MergeSource::Table { schema, name } => {
                ts.push(Token::QualifiedIdent {
                    schema: schema.clone(),
                    name: name.clone(),
                });
            }
            MergeSource::Query(query) => {
                ts.lparen().append(&query.to_tokens()).rparen();
            }
        }

        ts.space()
            .push(Token::As)
            .space()
            .push(Token::Ident(self.source_alias.clone()));

        // ON condition
        ts.space()
            .push(Token::On)
            .space()
            .append(&self.on_condition.to_tokens());

        // WHEN clauses
        for clause in &self.when_clauses {
            ts.space().append(&clause.to_tokens());
        }

        ts
    }
}

impl WhenClause {
    /// Convert to token stream.
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        // WHEN [NOT] MATCHED
        ts.push(Token::When).space();
        if !self.matched {
            ts.push(Token::Not).space();
        }
        ts.push(Token::Matched);

        // Optional AND condition, bound as the right operand of AND
        if let Some(ref cond) = self.condition {
            ts.space().push(Token::And).space();
            if matches!(cond, Expr::BinaryOp { op: BinaryOperator::Or, .. }) {
                ts.lparen().append(&cond.to_tokens()).rparen();
            } else {
                ts.append(&cond.to_tokens());
            }
        }

        // THEN action
        ts.space().push(Token::Then).space();

        match &self.action {
            MergeAction::Update { assignments } => {
                ts.push(Token::Update).space().push(Token::Set).space();
                push_assignments(&mut ts, assignments);
            }
            MergeAction::Delete => {
                ts.push(Token::Delete);
            }
            MergeAction::Insert { columns, values } => {
                ts.push(Token::Insert).space().lparen();
                ts.comma_separated(columns, |ts, col| {
                    ts.push(Token::Ident(col.clone()));
                });
                ts.rparen().space().push(Token::Values).space().lparen();
                ts.comma_separated(values, |ts, val| {
                    ts.append(&val.to_tokens());
                });
                ts.rparen();
            }
        }

        ts
    }
}

// ============================================================================
// Tests
// ============================================================================
