//! Batch Service
//!
//! Resolves stored pipelines and hands them to the batch orchestrator.

use phantast_core::domain::batch::BatchJob;
use phantast_core::dto::batch::StartBatch;

use crate::batch::{BatchError, BatchOrchestrator};
use crate::repository::PipelineStore;

/// Starts a batch job for a stored pipeline
///
/// The pipeline is copied at start; editing it later does not affect the
/// running job.
pub async fn start_batch(
    store: &PipelineStore,
    orchestrator: &BatchOrchestrator,
    req: StartBatch,
) -> Result<BatchJob, BatchError> {
    let pipeline = store
        .find_by_id(req.pipeline_id)
        .ok_or(BatchError::PipelineNotFound(req.pipeline_id))?;

    tracing::info!(
        "Starting batch for pipeline '{}' over {}",
        pipeline.name,
        req.input_folder.display()
    );

    orchestrator
        .start(&pipeline, req.input_folder, req.output_folder)
        .await
}
