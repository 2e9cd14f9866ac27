//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline management and step editing.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use phantast_core::domain::pipeline::{Params, Pipeline};
use phantast_core::dto::pipeline::{
    AddStep, CreatePipeline, PipelineSummary, ReorderSteps, ToggleStep, ValidationReport,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::pipeline_service;

/// POST /api/pipeline/create
/// Create a new pipeline
pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(req): Json<CreatePipeline>,
) -> ApiResult<(StatusCode, Json<Pipeline>)> {
    tracing::info!("Creating pipeline: {}", req.name);

    let pipeline = pipeline_service::create_pipeline(&state.pipelines, req)?;

    Ok((StatusCode::CREATED, Json(pipeline)))
}

/// GET /api/pipeline/list
/// List all pipelines
pub async fn list_pipelines(State(state): State<AppState>) -> Json<Vec<PipelineSummary>> {
    tracing::debug!("Listing all pipelines");
    Json(pipeline_service::list_pipelines(&state.pipelines))
}

/// GET /api/pipeline/{id}
/// Get pipeline by ID
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Getting pipeline: {}", id);
    Ok(Json(pipeline_service::get_pipeline(&state.pipelines, id)?))
}

/// DELETE /api/pipeline/{id}
/// Delete a pipeline
pub async fn delete_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting pipeline: {}", id);

    pipeline_service::delete_pipeline(&state.pipelines, id)?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/pipeline/{id}/steps
/// Append a step
pub async fn add_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddStep>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("Adding '{}' step to pipeline {}", req.operation_id, id);

    let pipeline = pipeline_service::add_step(
        &state.pipelines,
        state.orchestrator.registry(),
        id,
        req,
    )?;

    Ok(Json(pipeline))
}

/// DELETE /api/pipeline/{id}/steps/{step_id}
/// Remove a step
pub async fn remove_step(
    State(state): State<AppState>,
    Path((id, step_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("Removing step {} from pipeline {}", step_id, id);
    Ok(Json(pipeline_service::remove_step(&state.pipelines, id, step_id)?))
}

/// POST /api/pipeline/{id}/steps/reorder
/// Move a step to a new position
pub async fn reorder_steps(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReorderSteps>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!(
        "Moving step {} to {} in pipeline {}",
        req.start_index,
        req.end_index,
        id
    );

    let pipeline =
        pipeline_service::reorder_steps(&state.pipelines, id, req.start_index, req.end_index)?;

    Ok(Json(pipeline))
}

/// POST /api/pipeline/{id}/steps/{step_id}/toggle
/// Enable or disable a step
pub async fn toggle_step(
    State(state): State<AppState>,
    Path((id, step_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ToggleStep>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Setting step {} enabled={}", step_id, req.enabled);

    let pipeline = pipeline_service::toggle_step(&state.pipelines, id, step_id, req.enabled)?;

    Ok(Json(pipeline))
}

/// PUT /api/pipeline/{id}/steps/{step_id}/params
/// Replace a step's params
pub async fn update_params(
    State(state): State<AppState>,
    Path((id, step_id)): Path<(Uuid, Uuid)>,
    Json(params): Json<Params>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Updating params of step {}", step_id);

    let pipeline = pipeline_service::update_params(&state.pipelines, id, step_id, params)?;

    Ok(Json(pipeline))
}

/// POST /api/pipeline/{id}/validate
/// Build the execution order and report problems
pub async fn validate_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ValidationReport>> {
    let report =
        pipeline_service::validate_pipeline(&state.pipelines, state.orchestrator.registry(), id)?;

    Ok(Json(report))
}
