//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::batch::BatchError;
use crate::service::pipeline_service::PipelineError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(_) | PipelineError::StepNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            PipelineError::Validation(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::PipelineNotFound(_) => ApiError::NotFound(err.to_string()),
            BatchError::Validation(_)
            | BatchError::InputEnumeration(_)
            | BatchError::InvalidConfig(_) => ApiError::BadRequest(err.to_string()),
            BatchError::AlreadyRunning | BatchError::NotRunning => {
                ApiError::Conflict(err.to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
