//! Batch API Handlers
//!
//! HTTP endpoints for starting, watching and cancelling batch jobs.

use axum::{Json, extract::State, http::StatusCode};
use phantast_core::domain::batch::{BatchConfig, BatchJob, JobReport, ProgressState};
use phantast_core::dto::batch::{BatchStatus, StartBatch};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::batch_service;

/// POST /api/batch/start
/// Start a batch job
pub async fn start_batch(
    State(state): State<AppState>,
    Json(req): Json<StartBatch>,
) -> ApiResult<(StatusCode, Json<BatchJob>)> {
    let job = batch_service::start_batch(&state.pipelines, &state.orchestrator, req).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// POST /api/batch/cancel
/// Cancel the running job
pub async fn cancel_batch(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.orchestrator.cancel()?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /api/batch/progress
pub async fn get_progress(State(state): State<AppState>) -> Json<ProgressState> {
    Json(state.orchestrator.progress())
}

/// GET /api/batch/status
/// Orchestrator state with the active job
pub async fn get_status(State(state): State<AppState>) -> Json<BatchStatus> {
    Json(state.orchestrator.status())
}

/// GET /api/batch/report
/// Report of the last finished job
pub async fn get_report(State(state): State<AppState>) -> ApiResult<Json<JobReport>> {
    state
        .orchestrator
        .report()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No finished batch job".to_string()))
}

/// GET /api/batch/config
pub async fn get_config(State(state): State<AppState>) -> Json<BatchConfig> {
    Json(state.orchestrator.config())
}

/// PUT /api/batch/config
/// Replace the rendering options (rejected while a job runs)
pub async fn update_config(
    State(state): State<AppState>,
    Json(config): Json<BatchConfig>,
) -> ApiResult<Json<BatchConfig>> {
    tracing::info!("Updating batch config");
    state.orchestrator.update_config(config)?;
    Ok(Json(state.orchestrator.config()))
}
