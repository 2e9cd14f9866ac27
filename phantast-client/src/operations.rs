//! Operation catalog endpoint

use crate::OrchestratorClient;
use crate::error::Result;
use phantast_core::domain::operation::OperationCategory;

impl OrchestratorClient {
    /// Registered operations grouped by category
    pub async fn list_operations(&self) -> Result<Vec<OperationCategory>> {
        let url = format!("{}/api/operations", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
