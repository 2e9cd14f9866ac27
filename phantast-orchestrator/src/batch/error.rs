//! Batch errors
//!
//! Pre-flight failures that keep a job from starting, plus control-surface
//! misuse. Per-file failures never surface here; they land in the report.

use phantast_engine::ValidationError;
use thiserror::Error;
use uuid::Uuid;

use crate::io::InputEnumerationError;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid pipeline: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    InputEnumeration(#[from] InputEnumerationError),

    #[error("a batch job is already running")]
    AlreadyRunning,

    #[error("no batch job is running")]
    NotRunning,

    #[error("invalid batch config: {0}")]
    InvalidConfig(String),

    #[error("Pipeline {0} not found")]
    PipelineNotFound(Uuid),
}
