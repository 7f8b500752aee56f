//! Run-fatal errors.

use thiserror::Error;

use crate::llm::ModelError;

/// Errors that terminate a run.
///
/// Everything not listed here (unknown capabilities in lenient mode,
/// capability failures, persistence failures) is absorbed as data.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model invocation failed: {0}")]
    Model(#[from] ModelError),

    #[error("failed to create execution record: {0}")]
    RecordCreate(String),

    #[error("dynamic context resolution failed: {0}")]
    DynamicContext(String),

    #[error("unknown capabilities declared by task: {}", .0.join(", "))]
    UnknownCapabilities(Vec<String>),

    #[error("run cancelled by request")]
    Cancelled,
}
