//! Schema evolution - adapt a main table to the columns staging delivers.
//!
//! The diff is computed column by column, case-insensitively:
//!
//! | Staging vs main | Outcome |
//! |-----------------|---------|
//! | column only in staging | `ADD COLUMN` (nullable) |
//! | same type | nothing |
//! | same kind, larger size | resize if the sink supports it |
//! | staging type widens into main type | nothing, values fit as they are |
//! | main type widens into staging type | `ALTER COLUMN` to the staging type |
//! | anything else | [`EvolutionError::BreakingTypeChange`] |
//! | key column only in main | [`EvolutionError::MissingPrimaryKey`] |
//! | NOT NULL column only in main | `DROP NOT NULL` |
//!
//! Which type changes count as widening is decided by a [`WideningPolicy`]
//! supplied with the sink; [`DefaultWidening`] covers the usual numeric,
//! text and temporal ladders.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use crate::dataset::{Dataset, Field, SchemaDefinition};
use crate::logical_plan::{LogicalPlan, Operation};
use crate::sql::ddl::{AlterAction, AlterTable, ColumnDef};
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::types::{DataType, TypeFamily};

/// Schema differences the sink cannot absorb.
#[derive(Debug, Error)]
pub enum EvolutionError {
    #[error("column '{field}' cannot change from {main} to {staging}")]
    BreakingTypeChange {
        field: String,
        main: DataType,
        staging: DataType,
    },

    #[error("{dialect} cannot {change} for column '{field}'")]
    UnsupportedAlteration {
        field: String,
        change: &'static str,
        dialect: Dialect,
    },

    #[error("primary key column '{0}' is missing from staging")]
    MissingPrimaryKey(String),
}

pub type EvolutionResult<T> = Result<T, EvolutionError>;

// =============================================================================
// Widening Policy
// =============================================================================

/// Decides which type changes lose no information.
pub trait WideningPolicy: fmt::Debug + Send + Sync {
    /// Whether every value of `from` can be stored in a column of type `to`.
    fn can_widen(&self, from: &DataType, to: &DataType) -> bool;
}

/// Integer and float ladders, integers into wide enough decimals, any
/// text into unbounded text, and dates into timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWidening;

impl WideningPolicy for DefaultWidening {
    fn can_widen(&self, from: &DataType, to: &DataType) -> bool {
        if let (Some(a), Some(b)) = (integer_rank(from), integer_rank(to)) {
            return a <= b;
        }
        match (from, to) {
            (DataType::Float32, DataType::Float64) => true,
            (f, DataType::Float64) if f.family() == TypeFamily::Integer => {
                matches!(f, DataType::Int8 | DataType::Int16 | DataType::Int32)
            }
            (f, DataType::Decimal(precision, scale)) => integer_rank(f)
                .map(|rank| integer_digits(rank) <= precision.saturating_sub(*scale))
                .unwrap_or(false),
            (DataType::Char(n), DataType::Varchar(m)) => n <= m,
            (f, DataType::String) => f.family() == TypeFamily::Text,
            (DataType::Date, DataType::Timestamp | DataType::TimestampTz) => true,
            (DataType::Timestamp, DataType::TimestampTz) => true,
            _ => false,
        }
    }
}

fn integer_rank(dt: &DataType) -> Option<u8> {
    match dt {
        DataType::Int8 => Some(0),
        DataType::Int16 => Some(1),
        DataType::Int32 => Some(2),
        DataType::Int64 => Some(3),
        _ => None,
    }
}

/// Decimal digits needed for the largest value of an integer rank.
fn integer_digits(rank: u8) -> u8 {
    match rank {
        0 => 3,
        1 => 5,
        2 => 10,
        _ => 19,
    }
}

// =============================================================================
// Evolution
// =============================================================================

/// The alterations to run and the main dataset they produce.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaEvolutionResult {
    pub plan: LogicalPlan,
    pub evolved: Dataset,
}

/// Computes the main-table alterations for one sink.
#[derive(Debug)]
pub struct SchemaEvolution<'a> {
    dialect: Dialect,
    widening: &'a dyn WideningPolicy,
}

impl<'a> SchemaEvolution<'a> {
    pub fn new(dialect: Dialect, widening: &'a dyn WideningPolicy) -> Self {
        Self { dialect, widening }
    }

    /// Diff `staging` against `main`, skipping `ignored` columns on both sides.
    pub fn build_for(
        &self,
        main: &Dataset,
        staging: &Dataset,
        ignored: &[String],
    ) -> EvolutionResult<SchemaEvolutionResult> {
        let is_ignored = |name: &str| ignored.iter().any(|i| i.eq_ignore_ascii_case(name));
        let mut fields = main.schema.fields.clone();
        let mut actions = Vec::new();

        for staged in staging.schema.fields.iter().filter(|f| !is_ignored(&f.name)) {
            match fields
                .iter_mut()
                .find(|f| f.name.eq_ignore_ascii_case(&staged.name))
            {
                None => {
                    self.require(self.dialect.supports_add_column(), &staged.name, "add a column")?;
                    info!(column = %staged.name, data_type = %staged.data_type, "adding column to main");
                    actions.push(AlterAction::AddColumn(ColumnDef::new(
                        &staged.name,
                        staged.data_type.clone(),
                    )));
                    fields.push(Field::new(&staged.name, staged.data_type.clone()));
                }
                Some(existing) => {
                    if let Some(data_type) = self.evolve_type(existing, &staged.data_type)? {
                        info!(column = %existing.name, from = %existing.data_type, to = %data_type, "altering main column type");
                        actions.push(AlterAction::AlterColumnType {
                            name: existing.name.clone(),
                            data_type: data_type.clone(),
                        });
                        existing.data_type = data_type;
                    }
                }
            }
        }

        for field in fields.iter_mut().filter(|f| !is_ignored(&f.name)) {
            if staging.schema.contains(&field.name) {
                continue;
            }
            if field.primary_key {
                return Err(EvolutionError::MissingPrimaryKey(field.name.clone()));
            }
            if !field.nullable {
                self.require(
                    self.dialect.supports_drop_not_null(),
                    &field.name,
                    "drop NOT NULL",
                )?;
                info!(column = %field.name, "making main column nullable");
                actions.push(AlterAction::DropNotNull {
                    name: field.name.clone(),
                });
                field.nullable = true;
            }
        }

        debug!(main = main.name(), alterations = actions.len(), "schema evolution computed");
        let plan = actions
            .into_iter()
            .map(|action| Operation::Alter(AlterTable::new(main.name(), action).schema(main.group())))
            .collect();
        Ok(SchemaEvolutionResult {
            plan,
            evolved: main.clone().with_schema(SchemaDefinition::new(fields)),
        })
    }

    /// The type main must change to, if any.
    fn evolve_type(&self, main: &Field, staging: &DataType) -> EvolutionResult<Option<DataType>> {
        let current = &main.data_type;
        if current == staging {
            return Ok(None);
        }

        if current.same_kind(staging) {
            return match current.max_sized(staging) {
                Some(sized) if &sized == current => Ok(None),
                Some(sized) => {
                    self.require(
                        self.dialect.supports_data_sizing_changes(),
                        &main.name,
                        "resize a column",
                    )?;
                    Ok(Some(sized))
                }
                None => Err(self.breaking(main, staging)),
            };
        }

        if self.widening.can_widen(staging, current) {
            return Ok(None);
        }
        if self.widening.can_widen(current, staging) {
            self.require(
                self.dialect.supports_alter_column_type(),
                &main.name,
                "change a column type",
            )?;
            return Ok(Some(staging.clone()));
        }
        Err(self.breaking(main, staging))
    }

    fn require(&self, supported: bool, field: &str, change: &'static str) -> EvolutionResult<()> {
        if supported {
            Ok(())
        } else {
            Err(EvolutionError::UnsupportedAlteration {
                field: field.to_string(),
                change,
                dialect: self.dialect,
            })
        }
    }

    fn breaking(&self, main: &Field, staging: &DataType) -> EvolutionError {
        EvolutionError::BreakingTypeChange {
            field: main.name.clone(),
            main: main.data_type.clone(),
            staging: staging.clone(),
        }
    }
}
