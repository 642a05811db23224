//! # Milestone
//!
//! A relational ingestion engine that milestones staging batches into
//! historized tables across SQL dialects.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Datasets + IngestMode (what to ingest, how)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [planner]
//! ┌─────────────────────────────────────────────────────────┐
//! │     LogicalPlan per phase (+ schema evolution plan)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [transformer, per sink]
//! ┌─────────────────────────────────────────────────────────┐
//! │                GeneratorResult (SQL text)                │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [ingestor + executor]
//! ┌─────────────────────────────────────────────────────────┐
//! │     One transaction: batch id, statistics, metadata      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The generator is pure: the same datasets, mode and options always render
//! the same SQL. The ingestor owns execution and the transaction.

pub mod config;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod generator;
pub mod importer;
pub mod ingest_mode;
pub mod ingestor;
pub mod logical_plan;
pub mod planner;
pub mod schema_evolution;
pub mod sql;
pub mod transformer;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::dataset::{
        Dataset, DatasetFilter, Datasets, ExternalSource, Field, FieldValue, FilterOp,
        MetadataDataset,
    };
    pub use crate::error::{IngestError, IngestResult};
    pub use crate::executor::{Executor, SqliteExecutor};
    pub use crate::generator::{GeneratorOptions, GeneratorResult, RelationalGenerator};
    pub use crate::ingest_mode::{
        AppendOnly, BitemporalDelta, BitemporalSnapshot, Deduplication, IngestMode,
        MergeStrategy, NontemporalDelta, TransactionMilestoning, UnitemporalDelta,
        UnitemporalSnapshot, ValidityDerivation, ValidityMilestoning,
    };
    pub use crate::ingestor::{IngestorResult, RelationalIngestor};
    pub use crate::planner::{DataSplitRange, StatisticName};
    pub use crate::sql::{DataType, Dialect};
    pub use crate::transformer::{CaseConversion, Sink, SinkRegistry, SqlPlan};
}

pub use generator::RelationalGenerator;
pub use ingestor::RelationalIngestor;
pub use sql::Dialect;
