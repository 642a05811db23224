//! Column data types shared by the dataset model and DDL rendering.
//!
//! A field's type is declared once, dialect-free. Each [`SqlDialect`]
//! maps it to the column type its engine understands when tables are
//! created or altered.
//!
//! [`SqlDialect`]: super::dialect::SqlDialect

use std::fmt;

use serde::{Deserialize, Serialize};

/// Column data type.
///
/// Sized variants carry their declared length, precision or scale so
/// schema evolution can compare and widen them.
///
/// ```ignore
/// use milestone::sql::types::DataType;
///
/// assert_eq!(DataType::parse("varchar(64)"), Some(DataType::Varchar(64)));
/// assert_eq!(DataType::Decimal(18, 2).to_string(), "DECIMAL(18,2)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    /// Precision and scale.
    Decimal(u8, u8),
    /// Unbounded character data.
    String,
    Char(u16),
    Varchar(u16),
    Date,
    Time,
    /// Timestamp without zone; all milestoning timestamps use this.
    Timestamp,
    TimestampTz,
    Binary,
    Json,
}

/// Broad grouping used when deciding whether one type may replace another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Boolean,
    Integer,
    Float,
    Decimal,
    Text,
    Temporal,
    Other,
}

impl DataType {
    /// Parse a type name as written in job files and catalog metadata.
    ///
    /// Accepts the common spellings (`int`, `bigint`, `varchar(n)`,
    /// `decimal(p,s)`, `datetime`, ...). Returns `None` for anything else.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();

        if let Some(inner) = parens(&s, &["decimal", "numeric", "number"]) {
            let (p, sc) = inner.split_once(',')?;
            return Some(DataType::Decimal(p.trim().parse().ok()?, sc.trim().parse().ok()?));
        }
        if let Some(inner) = parens(&s, &["varchar", "character varying", "string"]) {
            return inner.trim().parse().ok().map(DataType::Varchar);
        }
        if let Some(inner) = parens(&s, &["char", "character"]) {
            return inner.trim().parse().ok().map(DataType::Char);
        }

        match s.as_str() {
            "bool" | "boolean" | "bit" => Some(DataType::Bool),
            "tinyint" | "int8" => Some(DataType::Int8),
            "smallint" | "int16" | "int2" => Some(DataType::Int16),
            "int" | "integer" | "int32" | "int4" => Some(DataType::Int32),
            "bigint" | "int64" | "long" => Some(DataType::Int64),
            "real" | "float" | "float4" | "float32" => Some(DataType::Float32),
            "double" | "double precision" | "float8" | "float64" => Some(DataType::Float64),
            "decimal" | "numeric" | "number" => Some(DataType::Decimal(38, 0)),
            "text" | "string" | "varchar" | "clob" => Some(DataType::String),
            "date" => Some(DataType::Date),
            "time" => Some(DataType::Time),
            "timestamp" | "datetime" | "timestamp_ntz" => Some(DataType::Timestamp),
            "timestamptz" | "timestamp with time zone" | "timestamp_tz" => {
                Some(DataType::TimestampTz)
            }
            "binary" | "blob" | "bytes" | "varbinary" => Some(DataType::Binary),
            "json" | "variant" => Some(DataType::Json),
            _ => None,
        }
    }

    pub fn family(&self) -> TypeFamily {
        match self {
            DataType::Bool => TypeFamily::Boolean,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                TypeFamily::Integer
            }
            DataType::Float32 | DataType::Float64 => TypeFamily::Float,
            DataType::Decimal(_, _) => TypeFamily::Decimal,
            DataType::String | DataType::Char(_) | DataType::Varchar(_) => TypeFamily::Text,
            DataType::Date | DataType::Time | DataType::Timestamp | DataType::TimestampTz => {
                TypeFamily::Temporal
            }
            DataType::Binary | DataType::Json => TypeFamily::Other,
        }
    }

    /// Returns true if values of this type render as quoted strings.
    pub fn is_string(&self) -> bool {
        self.family() == TypeFamily::Text
    }

    pub fn is_temporal(&self) -> bool {
        self.family() == TypeFamily::Temporal
    }

    /// Same type constructor, ignoring length, precision and scale.
    pub fn same_kind(&self, other: &DataType) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Merge the sizing of two types of the same kind, keeping the larger
    /// length (or precision and scale). Returns `None` for different kinds.
    pub fn max_sized(&self, other: &DataType) -> Option<DataType> {
        match (self, other) {
            (DataType::Varchar(a), DataType::Varchar(b)) => Some(DataType::Varchar(*a.max(b))),
            (DataType::Char(a), DataType::Char(b)) => Some(DataType::Char(*a.max(b))),
            (DataType::Decimal(p1, s1), DataType::Decimal(p2, s2)) => {
                Some(DataType::Decimal(*p1.max(p2), *s1.max(s2)))
            }
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "BOOLEAN"),
            DataType::Int8 => write!(f, "TINYINT"),
            DataType::Int16 => write!(f, "SMALLINT"),
            DataType::Int32 => write!(f, "INTEGER"),
            DataType::Int64 => write!(f, "BIGINT"),
            DataType::Float32 => write!(f, "REAL"),
            DataType::Float64 => write!(f, "DOUBLE"),
            DataType::Decimal(p, s) => write!(f, "DECIMAL({},{})", p, s),
            DataType::String => write!(f, "VARCHAR"),
            DataType::Char(n) => write!(f, "CHAR({})", n),
            DataType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DataType::Date => write!(f, "DATE"),
            DataType::Time => write!(f, "TIME"),
            DataType::Timestamp => write!(f, "DATETIME"),
            DataType::TimestampTz => write!(f, "TIMESTAMP WITH TIME ZONE"),
            DataType::Binary => write!(f, "BINARY"),
            DataType::Json => write!(f, "JSON"),
        }
    }
}

impl TryFrom<String> for DataType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DataType::parse(&value).ok_or_else(|| format!("unknown data type: {}", value))
    }
}

impl From<DataType> for String {
    fn from(dt: DataType) -> Self {
        dt.to_string()
    }
}

/// Content of `name(...)` for the first matching prefix.
fn parens(s: &str, prefixes: &[&str]) -> Option<String> {
    prefixes.iter().find_map(|prefix| {
        let rest = s.strip_prefix(prefix)?.trim();
        let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
        Some(inner.to_string())
    })
}
