//! Batch DTOs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::batch::{BatchJob, BatchState, ProgressState};

/// Request to start a batch run
///
/// Without `output_folder` the orchestrator writes into a sub-folder of the
/// input folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartBatch {
    pub input_folder: PathBuf,
    pub pipeline_id: Uuid,
    #[serde(default)]
    pub output_folder: Option<PathBuf>,
}

/// Snapshot of the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub state: BatchState,
    pub active_job: Option<BatchJob>,
    pub progress: ProgressState,
}
