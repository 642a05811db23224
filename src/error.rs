//! Top-level error of an ingest call.

use thiserror::Error;

use crate::executor::ExecutorError;
use crate::generator::GeneratorError;
use crate::importer::ImportError;
use crate::planner::{PlanError, StatisticName};

/// Everything [`crate::ingestor::RelationalIngestor`] can fail with.
///
/// Configuration problems surface as `Generator` before any statement runs.
/// A failing statement surfaces as `Execution`, carrying the executor's
/// error exactly as it was raised.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Execution(#[from] ExecutorError),

    #[error("next batch id query returned {0}")]
    InvalidBatchId(String),

    #[error("{statistic} query returned {value}")]
    InvalidStatistic {
        statistic: StatisticName,
        value: String,
    },

    #[error("ingest ran no pass")]
    NoPass,
}

impl From<PlanError> for IngestError {
    fn from(err: PlanError) -> Self {
        IngestError::Generator(GeneratorError::Plan(err))
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
