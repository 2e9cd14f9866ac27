//! Pipeline graph
//!
//! Turns a pipeline into the validated, linear sequence of enabled steps the
//! runner executes. The graph is a strict total order: each step's only
//! upstream dependency is its predecessor. Disabled steps are dropped
//! entirely and leave no trace in the fingerprint chain.

use phantast_core::domain::pipeline::{Pipeline, PipelineStep};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::registry::ExecutorRegistry;

/// Validated, linearized enabled steps of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOrder {
    pipeline_id: Uuid,
    steps: Vec<PipelineStep>,
}

impl ExecutionOrder {
    /// Builds the execution order for `pipeline`
    ///
    /// # Errors
    /// - `DuplicateStepId` if two steps share an id
    /// - `EmptyPipeline` if no step is enabled
    /// - `DuplicateOrder` if two enabled steps share an order value
    /// - `UnknownOperation` if an enabled step's operation is not registered
    pub fn build(pipeline: &Pipeline, registry: &ExecutorRegistry) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        for step in &pipeline.steps {
            if !seen.insert(step.id) {
                return Err(ValidationError::DuplicateStepId(step.id));
            }
        }

        let mut steps: Vec<PipelineStep> = pipeline
            .steps
            .iter()
            .filter(|step| step.enabled)
            .cloned()
            .collect();

        if steps.is_empty() {
            return Err(ValidationError::EmptyPipeline(pipeline.id));
        }

        steps.sort_by_key(|step| step.order);

        if let Some(pair) = steps.windows(2).find(|pair| pair[0].order == pair[1].order) {
            return Err(ValidationError::DuplicateOrder {
                order: pair[0].order,
                first: pair[0].id,
                second: pair[1].id,
            });
        }

        if let Some(step) = steps
            .iter()
            .find(|step| !registry.contains(&step.operation_id))
        {
            return Err(ValidationError::UnknownOperation {
                step_id: step.id,
                operation_id: step.operation_id.clone(),
            });
        }

        Ok(Self {
            pipeline_id: pipeline.id,
            steps,
        })
    }

    pub fn pipeline_id(&self) -> Uuid {
        self.pipeline_id
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn step_ids(&self) -> Vec<Uuid> {
        self.steps.iter().map(|step| step.id).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a built order; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Position of a step in the order, if it is part of it
    pub fn position(&self, step_id: Uuid) -> Option<usize> {
        self.steps.iter().position(|step| step.id == step_id)
    }

    /// The step a given step depends on (`None` for the first step)
    pub fn upstream_of(&self, step_id: Uuid) -> Option<&PipelineStep> {
        match self.position(step_id)? {
            0 => None,
            idx => self.steps.get(idx - 1),
        }
    }

    /// Dependency edges `(upstream, downstream)` in order
    pub fn edges(&self) -> Vec<(Uuid, Uuid)> {
        self.steps
            .windows(2)
            .map(|pair| (pair[0].id, pair[1].id))
            .collect()
    }
}
