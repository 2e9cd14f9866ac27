//! Phantast HTTP Client
//!
//! A type-safe HTTP client for the Phantast orchestrator API.
//!
//! # Example
//!
//! ```no_run
//! use phantast_client::OrchestratorClient;
//! use phantast_core::dto::batch::StartBatch;
//! use phantast_core::dto::pipeline::{CreatePipeline, CreateStep};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     let pipeline = client.create_pipeline(CreatePipeline {
//!         name: "passthrough".to_string(),
//!         steps: vec![CreateStep {
//!             operation_id: "identity".to_string(),
//!             name: None,
//!             order: None,
//!             enabled: true,
//!             params: None,
//!         }],
//!     }).await?;
//!
//!     let job = client.start_batch(StartBatch {
//!         input_folder: "/data/plate-1".into(),
//!         pipeline_id: pipeline.id,
//!         output_folder: None,
//!     }).await?;
//!
//!     println!("Started job {} over {} files", job.id, job.total_files);
//!     Ok(())
//! }
//! ```

pub mod error;
mod batch;
mod operations;
mod pipelines;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Phantast orchestrator API
///
/// Methods are organized into groups:
/// - Pipeline management and step editing
/// - Operation catalog
/// - Batch control, progress and reports
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Example
    /// ```
    /// use phantast_client::OrchestratorClient;
    ///
    /// let client = OrchestratorClient::new("http://localhost:8080/");
    /// assert_eq!(client.base_url(), "http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Checks that the orchestrator answers its health endpoint
    pub async fn health(&self) -> Result<serde_json::Value> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Request failed with {}: {}", status, error_text);
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content (e.g., DELETE operations)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}
