//! Pipeline domain types
//!
//! A pipeline is a flat list of analysis steps. The `order` field defines a
//! total order but may contain gaps, so every consumer sorts instead of
//! trusting positions in `steps`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque step parameters, owned by the step's operation.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Pipeline definition
///
/// Owned by the pipeline store (edited) and read by the engine (executed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub steps: Vec<PipelineStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single configurable analysis step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: Uuid,
    pub order: i64,
    /// Selects the registered step executor
    pub operation_id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub params: Params,
}

fn default_enabled() -> bool {
    true
}

impl PipelineStep {
    /// Creates an enabled step with a fresh id
    pub fn new(order: i64, operation_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order,
            operation_id: operation_id.into(),
            name: name.into(),
            enabled: true,
            params: Params::new(),
        }
    }

    /// Replaces the parameters, builder style
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Sets the enabled flag, builder style
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl Pipeline {
    /// Creates an empty pipeline
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a pipeline from existing steps, keeping their orders as given
    pub fn with_steps(name: impl Into<String>, steps: Vec<PipelineStep>) -> Self {
        let mut pipeline = Self::new(name);
        pipeline.steps = steps;
        pipeline
    }

    /// Looks up a step by id
    pub fn step(&self, step_id: Uuid) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Steps sorted by ascending `order`; ties keep their list position.
    pub fn ordered_steps(&self) -> Vec<&PipelineStep> {
        let mut steps: Vec<&PipelineStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    /// Sorts the steps by `order` and renumbers them contiguously from 1
    pub fn normalize(&mut self) {
        self.steps.sort_by_key(|s| s.order);
        for (idx, step) in self.steps.iter_mut().enumerate() {
            step.order = idx as i64 + 1;
        }
    }

    /// Appends a new enabled step after the current last one
    ///
    /// Returns the id of the created step.
    pub fn add_step(
        &mut self,
        operation_id: impl Into<String>,
        name: impl Into<String>,
        params: Params,
    ) -> Uuid {
        let order = self.steps.iter().map(|s| s.order).max().unwrap_or(0) + 1;
        let step = PipelineStep::new(order, operation_id, name).with_params(params);
        let id = step.id;
        self.steps.push(step);
        self.touch();
        id
    }

    /// Removes a step; returns `false` if no step has this id
    pub fn remove_step(&mut self, step_id: Uuid) -> bool {
        let before = self.steps.len();
        self.steps.retain(|s| s.id != step_id);
        let removed = self.steps.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Moves the step at `start_index` to `end_index` (positions in sorted order)
    ///
    /// Orders are renumbered contiguously afterwards. Returns `false` when
    /// either index is out of range.
    pub fn reorder_steps(&mut self, start_index: usize, end_index: usize) -> bool {
        if start_index >= self.steps.len() || end_index >= self.steps.len() {
            return false;
        }
        self.normalize();
        let step = self.steps.remove(start_index);
        self.steps.insert(end_index, step);
        for (idx, step) in self.steps.iter_mut().enumerate() {
            step.order = idx as i64 + 1;
        }
        self.touch();
        true
    }

    /// Enables or disables a step without removing it
    pub fn toggle_step(&mut self, step_id: Uuid, enabled: bool) -> bool {
        match self.steps.iter_mut().find(|s| s.id == step_id) {
            Some(step) => {
                step.enabled = enabled;
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Replaces a step's parameters
    pub fn update_params(&mut self, step_id: Uuid, params: Params) -> bool {
        match self.steps.iter_mut().find(|s| s.id == step_id) {
            Some(step) => {
                step.params = params;
                self.touch();
                true
            }
            None => false,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
