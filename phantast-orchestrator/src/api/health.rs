//! Health Check API Handler
//!
//! Liveness plus a glance at the batch state for monitoring.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::api::AppState;

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "batch_state": state.orchestrator.state(),
            "operations": state.orchestrator.registry().len(),
        })),
    )
}
