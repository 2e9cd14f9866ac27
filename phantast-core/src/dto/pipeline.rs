//! Pipeline DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::{Params, Pipeline, PipelineStep};

/// Request to create a new pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<CreateStep>,
}

/// A step inside a create request
///
/// `order` defaults to the step's position in the list (1-based).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStep {
    pub operation_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub params: Option<Params>,
}

fn default_enabled() -> bool {
    true
}

impl CreatePipeline {
    /// Builds the domain pipeline, filling step defaults
    pub fn into_pipeline(self) -> Pipeline {
        let steps = self
            .steps
            .into_iter()
            .enumerate()
            .map(|(idx, step)| {
                let name = step.name.unwrap_or_else(|| step.operation_id.clone());
                PipelineStep::new(step.order.unwrap_or(idx as i64 + 1), step.operation_id, name)
                    .with_enabled(step.enabled)
                    .with_params(step.params.unwrap_or_default())
            })
            .collect();
        Pipeline::with_steps(self.name, steps)
    }
}

/// Request to append a step
///
/// When `params` is absent the operation's default params are used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddStep {
    pub operation_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub params: Option<Params>,
}

/// Request to move a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderSteps {
    pub start_index: usize,
    pub end_index: usize,
}

/// Request to enable/disable a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleStep {
    pub enabled: bool,
}

/// Lightweight pipeline summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: Uuid,
    pub name: String,
    pub step_count: usize,
    pub enabled_step_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&Pipeline> for PipelineSummary {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            id: pipeline.id,
            name: pipeline.name.clone(),
            step_count: pipeline.steps.len(),
            enabled_step_count: pipeline.steps.iter().filter(|s| s.enabled).count(),
            updated_at: pipeline.updated_at,
        }
    }
}

/// Outcome of validating a pipeline against the registered operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// Step ids in execution order (empty when invalid)
    pub execution_order: Vec<Uuid>,
    pub error: Option<String>,
}
