//! Batch-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use phantast_core::domain::batch::{BatchConfig, BatchJob, JobReport, ProgressState};
use phantast_core::dto::batch::{BatchStatus, StartBatch};

impl OrchestratorClient {
    // =============================================================================
    // Batch Control
    // =============================================================================

    /// Start a batch job
    ///
    /// Fails with a 409 API error while another job runs.
    pub async fn start_batch(&self, req: StartBatch) -> Result<BatchJob> {
        let url = format!("{}/api/batch/start", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Request cancellation of the running job
    pub async fn cancel_batch(&self) -> Result<()> {
        let url = format!("{}/api/batch/cancel", self.base_url);
        let response = self.client.post(&url).send().await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Progress & Reports
    // =============================================================================

    pub async fn batch_progress(&self) -> Result<ProgressState> {
        let url = format!("{}/api/batch/progress", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn batch_status(&self) -> Result<BatchStatus> {
        let url = format!("{}/api/batch/status", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Report of the last finished job (404 before any job finished)
    pub async fn batch_report(&self) -> Result<JobReport> {
        let url = format!("{}/api/batch/report", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Rendering Options
    // =============================================================================

    pub async fn batch_config(&self) -> Result<BatchConfig> {
        let url = format!("{}/api/batch/config", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Replace the rendering options (409 while a job runs)
    pub async fn update_batch_config(&self, config: &BatchConfig) -> Result<BatchConfig> {
        let url = format!("{}/api/batch/config", self.base_url);
        let response = self.client.put(&url).json(config).send().await?;

        self.handle_response(response).await
    }
}
