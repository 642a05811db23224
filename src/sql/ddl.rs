//! DDL (Data Definition Language) support.
//!
//! This module provides types and builders for generating DDL statements
//! (CREATE, ALTER, DROP) across different SQL dialects.
//!
//! # Examples
//!
//! ```ignore
//! use milestone::sql::ddl::{CreateTable, ColumnDef, DataType};
//! use milestone::sql::Dialect;
//!
//! let table = CreateTable::new("main")
//!     .if_not_exists()
//!     .column(ColumnDef::new("id", DataType::Int32).not_null())
//!     .column(ColumnDef::new("name", DataType::Varchar(64)))
//!     .primary_key(["id"]);
//!
//! println!("{}", table.to_sql(Dialect::Snowflake));
//! ```

use super::dialect::{Dialect, SqlDialect};
use super::token::{Token, TokenStream};

// Re-export DataType from sql::types for DDL generation
pub use super::types::DataType;

fn push_table(ts: &mut TokenStream, schema: &Option<String>, name: &str) {
    ts.push(Token::QualifiedIdent {
        schema: schema.clone(),
        name: name.to_string(),
    });
}

/// DDL statement types.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    CreateTable(CreateTable),
    AlterTable(AlterTable),
    DropTable(DropTable),
}

impl DdlStatement {
    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        match self {
            DdlStatement::CreateTable(ct) => ct.to_tokens(dialect),
            DdlStatement::AlterTable(at) => at.to_tokens(dialect),
            DdlStatement::DropTable(dt) => dt.to_tokens(dialect),
        }
    }
}

// ============================================================================
// CREATE TABLE
// ============================================================================

/// CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "DDL statements have no effect until converted to SQL with to_sql()"]
pub struct CreateTable {
    pub if_not_exists: bool,
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
}

impl CreateTable {
    /// Create a new CREATE TABLE statement.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            if_not_exists: false,
            schema: None,
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Add IF NOT EXISTS clause.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Add a column.
    pub fn column(mut self, col: ColumnDef) -> Self {
        self.columns.push(col);
        self
    }

    /// Add multiple columns.
    pub fn columns(mut self, cols: impl IntoIterator<Item = ColumnDef>) -> Self {
        self.columns.extend(cols);
        self
    }

    /// Set the table-level primary key. An empty list emits no constraint.
    pub fn primary_key(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.primary_key = columns.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        // CREATE TABLE
        ts.push(Token::Create).space().push(Token::Table);

        // IF NOT EXISTS (dialect-specific)
        if self.if_not_exists && dialect.supports_if_not_exists() {
            ts.space()
                .push(Token::If)
                .space()
                .push(Token::Not)
                .space()
                .push(Token::Exists);
        }

        // Table name
        ts.space();
        push_table(&mut ts, &self.schema, &self.name);

        // Column definitions and constraints
        ts.space().lparen();
        ts.comma_separated(&self.columns, |ts, col| {
            let forced_not_null = self.primary_key.contains(&col.name);
            ts.append(&col.to_tokens(forced_not_null));
        });

        if !self.primary_key.is_empty() {
            ts.comma().space();
            ts.push(Token::Primary).space().push(Token::Key).space().lparen();
            ts.comma_separated(&self.primary_key, |ts, name| {
                ts.push(Token::Ident(name.clone()));
            });
            ts.rparen();
        }

        ts.rparen();
        ts
    }
}

// ============================================================================
// Column Definition
// ============================================================================

/// Column definition for CREATE TABLE and ADD COLUMN.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnDef {
    /// Create a new nullable column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    /// Add NOT NULL constraint.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Primary-key columns are always emitted NOT NULL.
    pub fn to_tokens(&self, forced_not_null: bool) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Ident(self.name.clone()))
            .space()
            .push(Token::DataType(self.data_type.clone()));
        if !self.nullable || forced_not_null {
            ts.space().push(Token::NotNull);
        }
        ts
    }
}

// ============================================================================
// ALTER TABLE
// ============================================================================

/// ALTER TABLE statement.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "DDL statements have no effect until converted to SQL with to_sql()"]
pub struct AlterTable {
    pub schema: Option<String>,
    pub name: String,
    pub action: AlterAction,
}

impl AlterTable {
    /// Create a new ALTER TABLE statement with a single action.
    pub fn new(name: impl Into<String>, action: AlterAction) -> Self {
        Self {
            schema: None,
            name: name.into(),
            action,
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Alter).space().push(Token::Table).space();
        push_table(&mut ts, &self.schema, &self.name);
        ts.space().append(&self.action.to_tokens(dialect));
        ts
    }
}

/// ALTER TABLE actions.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    AddColumn(ColumnDef),
    /// Change a column's type (or grow its length/precision).
    AlterColumnType { name: String, data_type: DataType },
    DropNotNull { name: String },
}

impl AlterAction {
    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self {
            AlterAction::AddColumn(col) => {
                ts.push(Token::Add)
                    .space()
                    .push(Token::Column)
                    .space()
                    .append(&col.to_tokens(false));
            }
            AlterAction::AlterColumnType { name, data_type } => {
                ts.push(Token::Alter)
                    .space()
                    .push(Token::Column)
                    .space()
                    .push(Token::Ident(name.clone()));
                // Spanner has no keyword between the column and the type
                let clause = dialect.alter_column_type_clause();
                if !clause.is_empty() {
                    ts.space().push(Token::Keyword(clause));
                }
                ts.space().push(Token::DataType(data_type.clone()));
            }
            AlterAction::DropNotNull { name } => {
                ts.push(Token::Alter)
                    .space()
                    .push(Token::Column)
                    .space()
                    .push(Token::Ident(name.clone()))
                    .space()
                    .push(Token::Drop)
                    .space()
                    .push(Token::NotNull);
            }
        }

        ts
    }
}

// ============================================================================
// DROP TABLE
// ============================================================================

/// DROP TABLE statement.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "DDL statements have no effect until converted to SQL with to_sql()"]
pub struct DropTable {
    pub if_exists: bool,
    pub schema: Option<String>,
    pub name: String,
}

impl DropTable {
    /// Create a new DROP TABLE statement.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            if_exists: false,
            schema: None,
            name: name.into(),
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Add IF EXISTS clause.
    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Drop).space().push(Token::Table);

        if self.if_exists && dialect.supports_if_exists() {
            ts.space().push(Token::If).space().push(Token::Exists);
        }

        ts.space();
        push_table(&mut ts, &self.schema, &self.name);
        ts
    }
}

// ============================================================================
// Tests
// ============================================================================
