//! Logical plans: ordered, dialect-independent relational operations.
//!
//! The planner produces one [`LogicalPlan`] per ingest phase. Each
//! [`Operation`] wraps a statement builder from [`crate::sql`]; nothing is
//! rendered until a transformer lowers the plan for a sink.

use crate::sql::ddl::{AlterTable, CreateTable, DropTable};
use crate::sql::dml::{Delete, Insert, Merge, Update};
use crate::sql::query::Query;

/// One abstract relational operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(CreateTable),
    Alter(AlterTable),
    Drop(DropTable),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    /// Upsert; sinks without MERGE receive an equivalent statement sequence.
    Merge(Merge),
    /// Aggregate read, used for statistics and batch id lookup.
    Select(Query),
}

impl Operation {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Create(_) => "create",
            Operation::Alter(_) => "alter",
            Operation::Drop(_) => "drop",
            Operation::Insert(_) => "insert",
            Operation::Update(_) => "update",
            Operation::Delete(_) => "delete",
            Operation::Merge(_) => "merge",
            Operation::Select(_) => "select",
        }
    }
}

impl From<CreateTable> for Operation {
    fn from(op: CreateTable) -> Self {
        Operation::Create(op)
    }
}

impl From<AlterTable> for Operation {
    fn from(op: AlterTable) -> Self {
        Operation::Alter(op)
    }
}

impl From<DropTable> for Operation {
    fn from(op: DropTable) -> Self {
        Operation::Drop(op)
    }
}

impl From<Insert> for Operation {
    fn from(op: Insert) -> Self {
        Operation::Insert(op)
    }
}

impl From<Update> for Operation {
    fn from(op: Update) -> Self {
        Operation::Update(op)
    }
}

impl From<Delete> for Operation {
    fn from(op: Delete) -> Self {
        Operation::Delete(op)
    }
}

impl From<Merge> for Operation {
    fn from(op: Merge) -> Self {
        Operation::Merge(op)
    }
}

impl From<Query> for Operation {
    fn from(op: Query) -> Self {
        Operation::Select(op)
    }
}

/// An ordered sequence of operations for one phase.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "plans have no effect until transformed and executed"]
pub struct LogicalPlan {
    operations: Vec<Operation>,
}

impl LogicalPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plan holding exactly one operation.
    pub fn of(operation: impl Into<Operation>) -> Self {
        Self {
            operations: vec![operation.into()],
        }
    }

    /// Append an operation.
    pub fn then(mut self, operation: impl Into<Operation>) -> Self {
        self.operations.push(operation.into());
        self
    }

    /// Append every operation of another plan.
    pub fn then_all(mut self, other: LogicalPlan) -> Self {
        self.operations.extend(other.operations);
        self
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

impl FromIterator<Operation> for LogicalPlan {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a LogicalPlan {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}
