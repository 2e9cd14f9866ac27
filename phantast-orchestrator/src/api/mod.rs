//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod batch;
pub mod error;
pub mod health;
pub mod operation;
pub mod pipeline;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::batch::BatchOrchestrator;
use crate::repository::PipelineStore;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub pipelines: Arc<PipelineStore>,
    pub orchestrator: BatchOrchestrator,
}

impl AppState {
    pub fn new(pipelines: Arc<PipelineStore>, orchestrator: BatchOrchestrator) -> Self {
        Self {
            pipelines,
            orchestrator,
        }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Operation catalog
        .route("/api/operations", get(operation::list_operations))
        // Pipeline endpoints
        .route("/api/pipeline/create", post(pipeline::create_pipeline))
        .route("/api/pipeline/list", get(pipeline::list_pipelines))
        .route(
            "/api/pipeline/{id}",
            get(pipeline::get_pipeline).delete(pipeline::delete_pipeline),
        )
        .route("/api/pipeline/{id}/steps", post(pipeline::add_step))
        .route(
            "/api/pipeline/{id}/steps/reorder",
            post(pipeline::reorder_steps),
        )
        .route(
            "/api/pipeline/{id}/steps/{step_id}",
            delete(pipeline::remove_step),
        )
        .route(
            "/api/pipeline/{id}/steps/{step_id}/toggle",
            post(pipeline::toggle_step),
        )
        .route(
            "/api/pipeline/{id}/steps/{step_id}/params",
            put(pipeline::update_params),
        )
        .route(
            "/api/pipeline/{id}/validate",
            post(pipeline::validate_pipeline),
        )
        // Batch endpoints
        .route("/api/batch/start", post(batch::start_batch))
        .route("/api/batch/cancel", post(batch::cancel_batch))
        .route("/api/batch/progress", get(batch::get_progress))
        .route("/api/batch/status", get(batch::get_status))
        .route("/api/batch/report", get(batch::get_report))
        .route(
            "/api/batch/config",
            get(batch::get_config).put(batch::update_config),
        )
        // Add state and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
