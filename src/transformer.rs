//! Transformer - lower logical plans to SQL text for one sink.
//!
//! Every [`Operation`] becomes one or more statements rendered through the
//! sink's [`Dialect`]. Sinks without native MERGE receive an equivalent
//! sequence instead:
//!
//! ```text
//! MERGE INTO t USING s ON k          DELETE FROM t WHERE EXISTS (s on k and c1)
//!   WHEN MATCHED AND c1 THEN DELETE  UPDATE t SET x = (SELECT .. FROM s on k and c2)
//!   WHEN MATCHED AND c2 THEN UPDATE    WHERE EXISTS (s on k and c2)
//!   WHEN NOT MATCHED THEN INSERT     INSERT INTO t SELECT .. FROM s WHERE NOT EXISTS (t on k)
//! ```
//!
//! Sinks are looked up in an explicit [`SinkRegistry`] the caller builds
//! and hands to the generator.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::logical_plan::{LogicalPlan, Operation};
use crate::schema_evolution::{DefaultWidening, WideningPolicy};
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::dml::{Delete, Insert, Merge, MergeAction, MergeSource, Update, WhenClause};
use crate::sql::expr::{and_all, exists, lit_int, not_exists, Expr, ExprExt};
use crate::sql::query::{Query, TableRef};
use crate::sql::token::TokenStream;

// =============================================================================
// Sinks
// =============================================================================

/// A target engine: its dialect and the type widenings it accepts.
#[derive(Debug, Clone)]
pub struct Sink {
    name: String,
    dialect: Dialect,
    widening: Arc<dyn WideningPolicy>,
}

impl Sink {
    /// A sink using [`DefaultWidening`].
    pub fn new(name: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            name: name.into(),
            dialect,
            widening: Arc::new(DefaultWidening),
        }
    }

    pub fn with_widening(self, widening: Arc<dyn WideningPolicy>) -> Self {
        Self { widening, ..self }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn widening(&self) -> &dyn WideningPolicy {
        self.widening.as_ref()
    }
}

/// Named sinks available to a generator.
#[derive(Debug, Clone, Default)]
pub struct SinkRegistry {
    sinks: BTreeMap<String, Sink>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One sink per supported dialect, registered under the dialect name.
    pub fn with_defaults() -> Self {
        Dialect::ALL
            .into_iter()
            .fold(Self::new(), |registry, dialect| {
                registry.register(Sink::new(dialect.name(), dialect))
            })
    }

    /// Add or replace a sink.
    pub fn register(mut self, sink: Sink) -> Self {
        self.sinks.insert(sink.name.to_lowercase(), sink);
        self
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&Sink> {
        self.sinks.get(&name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sinks.keys().map(String::as_str)
    }
}

// =============================================================================
// Options and Output
// =============================================================================

/// Identifier case applied to every table, column and alias name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseConversion {
    #[default]
    None,
    ToUpper,
    ToLower,
}

impl CaseConversion {
    pub fn apply(&self, ident: &str) -> String {
        match self {
            CaseConversion::None => ident.to_string(),
            CaseConversion::ToUpper => ident.to_uppercase(),
            CaseConversion::ToLower => ident.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformOptions {
    pub case_conversion: CaseConversion,
}

/// Ordered SQL statements for one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlPlan {
    statements: Vec<String>,
}

impl SqlPlan {
    pub fn new(statements: Vec<String>) -> Self {
        Self { statements }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }
}

impl fmt::Display for SqlPlan {
    /// One statement per line, each terminated by `;`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            writeln!(f, "{};", statement)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a SqlPlan {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.iter()
    }
}

// =============================================================================
// Transformer
// =============================================================================

/// Renders logical plans for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct RelationalTransformer {
    dialect: Dialect,
    options: TransformOptions,
}

impl RelationalTransformer {
    pub fn new(dialect: Dialect, options: TransformOptions) -> Self {
        Self { dialect, options }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn generate_physical_plan(&self, plan: &LogicalPlan) -> SqlPlan {
        SqlPlan::new(
            plan.operations()
                .iter()
                .flat_map(|op| self.operation_tokens(op))
                .map(|ts| self.render(&ts))
                .collect(),
        )
    }

    fn operation_tokens(&self, operation: &Operation) -> Vec<TokenStream> {
        match operation {
            Operation::Create(create) => vec![create.to_tokens(self.dialect)],
            Operation::Alter(alter) => vec![alter.to_tokens(self.dialect)],
            Operation::Drop(drop) => vec![drop.to_tokens(self.dialect)],
            Operation::Insert(insert) => vec![insert.to_tokens()],
            Operation::Update(update) => vec![update.to_tokens()],
            Operation::Delete(delete) => vec![delete.to_tokens()],
            Operation::Select(query) => vec![query.to_tokens()],
            Operation::Merge(merge) if self.dialect.supports_merge() => vec![merge.to_tokens()],
            Operation::Merge(merge) => lower_merge(merge)
                .iter()
                .flat_map(|op| self.operation_tokens(op))
                .collect(),
        }
    }

    fn render(&self, ts: &TokenStream) -> String {
        match self.options.case_conversion {
            CaseConversion::None => ts.serialize(self.dialect),
            conversion => ts
                .map_identifiers(|ident| conversion.apply(ident))
                .serialize(self.dialect),
        }
    }
}

// =============================================================================
// MERGE Lowering
// =============================================================================

/// The same effect as `merge` without a MERGE statement.
///
/// Matched clauses run in their declared order and must not overlap;
/// inserts run last so they only see rows the merge would not match.
pub fn lower_merge(merge: &Merge) -> Vec<Operation> {
    let target_name = merge
        .target_alias
        .clone()
        .unwrap_or_else(|| merge.target_table.clone());
    let source = match &merge.source {
        MergeSource::Table { schema, name } => {
            let table = TableRef::new(name).with_alias(&merge.source_alias);
            match schema {
                Some(schema) => table.with_schema(schema),
                None => table,
            }
        }
        MergeSource::Query(query) => TableRef::derived((**query).clone(), &merge.source_alias),
    };
    let target = {
        let table = TableRef::new(&merge.target_table).with_alias(&target_name);
        match &merge.target_schema {
            Some(schema) => table.with_schema(schema),
            None => table,
        }
    };

    // Source rows matching the current target row under `condition`.
    let matching_source = |select: Vec<Expr>, condition: &Option<Expr>| {
        Query::new()
            .select(select)
            .from(source.clone())
            .filter_opt(and_all(
                [merge.on_condition.clone()]
                    .into_iter()
                    .chain(condition.clone()),
            ))
    };

    let mut matched = Vec::new();
    let mut inserts = Vec::new();
    for WhenClause {
        matched: is_matched,
        condition,
        action,
    } in &merge.when_clauses
    {
        match (is_matched, action) {
            (true, MergeAction::Delete) => matched.push(Operation::Delete(
                Delete::from(merge.target_table.clone())
                    .schema(merge.target_schema.clone())
                    .alias(target_name.clone())
                    .filter(exists(matching_source(vec![lit_int(1)], condition))),
            )),
            (true, MergeAction::Update { assignments }) => matched.push(Operation::Update(
                Update::table(merge.target_table.clone())
                    .schema(merge.target_schema.clone())
                    .alias(target_name.clone())
                    .set_many(assignments.iter().map(|(column, value)| {
                        (column.clone(), Expr::from(matching_source(vec![value.clone()], condition)))
                    }))
                    .filter(exists(matching_source(vec![lit_int(1)], condition))),
            )),
            (false, MergeAction::Insert { columns, values }) => {
                let unmatched = not_exists(
                    Query::new()
                        .select(vec![lit_int(1)])
                        .from(target.clone())
                        .filter(merge.on_condition.clone()),
                );
                inserts.push(Operation::Insert(
                    Insert::into(merge.target_table.clone())
                        .schema(merge.target_schema.clone())
                        .columns(columns.clone())
                        .from_select(
                            Query::new()
                                .select(values.clone())
                                .from(source.clone())
                                .filter_opt(and_all(condition.clone().into_iter().chain([unmatched]))),
                        ),
                ));
            }
            // A matched insert or unmatched update/delete has no target row to act on
            (true, MergeAction::Insert { .. })
            | (false, MergeAction::Update { .. })
            | (false, MergeAction::Delete) => {}
        }
    }
    matched.extend(inserts);
    matched
}
