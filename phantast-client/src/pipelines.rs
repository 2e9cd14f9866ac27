//! Pipeline-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use phantast_core::domain::pipeline::{Params, Pipeline};
use phantast_core::dto::pipeline::{
    AddStep, CreatePipeline, PipelineSummary, ReorderSteps, ToggleStep, ValidationReport,
};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Pipeline Management
    // =============================================================================

    /// Create a new pipeline
    pub async fn create_pipeline(&self, req: CreatePipeline) -> Result<Pipeline> {
        let url = format!("{}/api/pipeline/create", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// List all pipelines
    pub async fn list_pipelines(&self) -> Result<Vec<PipelineSummary>> {
        let url = format!("{}/api/pipeline/list", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get a pipeline by ID
    pub async fn get_pipeline(&self, pipeline_id: Uuid) -> Result<Pipeline> {
        let url = format!("{}/api/pipeline/{}", self.base_url, pipeline_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Delete a pipeline
    pub async fn delete_pipeline(&self, pipeline_id: Uuid) -> Result<()> {
        let url = format!("{}/api/pipeline/{}", self.base_url, pipeline_id);
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Step Editing
    // =============================================================================

    /// Append a step; params default to the operation's defaults
    pub async fn add_step(&self, pipeline_id: Uuid, req: AddStep) -> Result<Pipeline> {
        let url = format!("{}/api/pipeline/{}/steps", self.base_url, pipeline_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    pub async fn remove_step(&self, pipeline_id: Uuid, step_id: Uuid) -> Result<Pipeline> {
        let url = format!(
            "{}/api/pipeline/{}/steps/{}",
            self.base_url, pipeline_id, step_id
        );
        let response = self.client.delete(&url).send().await?;

        self.handle_response(response).await
    }

    /// Move the step at `start_index` to `end_index`
    pub async fn reorder_steps(
        &self,
        pipeline_id: Uuid,
        start_index: usize,
        end_index: usize,
    ) -> Result<Pipeline> {
        let url = format!("{}/api/pipeline/{}/steps/reorder", self.base_url, pipeline_id);
        let req = ReorderSteps {
            start_index,
            end_index,
        };
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    pub async fn toggle_step(&self, pipeline_id: Uuid, step_id: Uuid, enabled: bool) -> Result<Pipeline> {
        let url = format!(
            "{}/api/pipeline/{}/steps/{}/toggle",
            self.base_url, pipeline_id, step_id
        );
        let response = self
            .client
            .post(&url)
            .json(&ToggleStep { enabled })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Replace a step's params
    pub async fn update_params(&self, pipeline_id: Uuid, step_id: Uuid, params: &Params) -> Result<Pipeline> {
        let url = format!(
            "{}/api/pipeline/{}/steps/{}/params",
            self.base_url, pipeline_id, step_id
        );
        let response = self.client.put(&url).json(params).send().await?;

        self.handle_response(response).await
    }

    /// Validate a pipeline against the registered operations
    pub async fn validate_pipeline(&self, pipeline_id: Uuid) -> Result<ValidationReport> {
        let url = format!("{}/api/pipeline/{}/validate", self.base_url, pipeline_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }
}
