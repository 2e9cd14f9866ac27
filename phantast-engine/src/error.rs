//! Error types for the engine

use thiserror::Error;
use uuid::Uuid;

/// A pipeline that cannot be turned into an execution order
///
/// Raised before anything runs; a pipeline that fails validation is never
/// partially executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No enabled steps remain after filtering
    #[error("pipeline {0} has no enabled steps")]
    EmptyPipeline(Uuid),

    /// Two enabled steps share an order value
    #[error("steps {first} and {second} share order {order}")]
    DuplicateOrder { order: i64, first: Uuid, second: Uuid },

    /// Two steps share an id
    #[error("step id {0} appears more than once")]
    DuplicateStepId(Uuid),

    /// An enabled step references an operation with no registered executor
    #[error("step {step_id} references unknown operation '{operation_id}'")]
    UnknownOperation { step_id: Uuid, operation_id: String },
}

/// Parameters that cannot be fingerprinted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintError {
    #[error("invalid parameter '{key}': {reason}")]
    InvalidParameter { key: String, reason: String },
}

impl FingerprintError {
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a step executor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OperationError {
    pub message: String,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A step that could not produce a result for one image
///
/// Fatal for the image (remaining steps are skipped), never for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("step {step_id}: {source}")]
    InvalidParameter {
        step_id: Uuid,
        #[source]
        source: FingerprintError,
    },

    #[error("step {step_id} ({operation_id}) failed: {source}")]
    Operation {
        step_id: Uuid,
        operation_id: String,
        #[source]
        source: OperationError,
    },

    /// The registry no longer knows the operation the order was built with
    #[error("step {step_id} references unregistered operation '{operation_id}'")]
    MissingExecutor { step_id: Uuid, operation_id: String },
}

impl StepError {
    /// The step the error belongs to
    pub fn step_id(&self) -> Uuid {
        match self {
            StepError::InvalidParameter { step_id, .. }
            | StepError::Operation { step_id, .. }
            | StepError::MissingExecutor { step_id, .. } => *step_id,
        }
    }
}

/// Errors raised while populating the executor registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("operation '{0}' is already registered")]
    DuplicateOperation(String),

    #[error("operation id cannot be empty")]
    EmptyOperationId,
}
