//! Operation API Handlers

use axum::{Json, extract::State};
use phantast_core::domain::operation::OperationCategory;

use crate::api::AppState;

/// GET /api/operations
/// Registered operations grouped by category
pub async fn list_operations(State(state): State<AppState>) -> Json<Vec<OperationCategory>> {
    tracing::debug!("Listing operations");
    Json(state.orchestrator.registry().catalog())
}
