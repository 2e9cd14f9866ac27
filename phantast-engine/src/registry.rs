//! Step executor registry
//!
//! Maps operation ids to the capability that runs one analysis step. Adding an
//! operation means registering a new executor; the engine never interprets a
//! step's parameters itself.

use phantast_core::domain::image::Image;
use phantast_core::domain::operation::{OperationCategory, OperationMetadata};
use phantast_core::domain::pipeline::Params;
use phantast_core::domain::result::{StepOutput, StepResult};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{OperationError, RegistryError};

/// Input handed to an executor
///
/// `upstream` is `None` for the first step, which reads the raw image.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    pub image: &'a Image,
    pub upstream: Option<&'a StepResult>,
}

impl StepInput<'_> {
    /// Reference to the artifact this step should read
    pub fn artifact(&self) -> String {
        match self.upstream {
            Some(result) => result.image_url.clone(),
            None => self.image.path.to_string_lossy().into_owned(),
        }
    }
}

/// Capability that performs one analysis operation.
///
/// Executors run on blocking worker threads and may take arbitrarily long;
/// callers wanting timeouts wrap the executor before registering it.
///
/// # Example
///
/// ```rust
/// use phantast_core::domain::pipeline::Params;
/// use phantast_core::domain::result::StepOutput;
/// use phantast_engine::{ExecutorRegistry, OperationError, StepInput};
///
/// let mut registry = ExecutorRegistry::new();
/// registry
///     .register("passthrough", |input: StepInput<'_>, _params: &Params| {
///         Ok::<_, OperationError>(StepOutput::artifact(input.artifact()))
///     })
///     .unwrap();
///
/// assert!(registry.contains("passthrough"));
/// ```
pub trait StepExecutor: Send + Sync {
    /// Runs the operation against `input` with the step's `params`.
    fn execute(&self, input: StepInput<'_>, params: &Params) -> Result<StepOutput, OperationError>;

    /// Optional: describes the operation for the catalog.
    ///
    /// The default uses the registered id as name and no default params.
    fn metadata(&self, operation_id: &str) -> OperationMetadata {
        OperationMetadata {
            id: operation_id.to_string(),
            name: operation_id.to_string(),
            description: String::new(),
            category: "General".to_string(),
            default_params: Params::new(),
        }
    }
}

impl<F> StepExecutor for F
where
    F: for<'a> Fn(StepInput<'a>, &Params) -> Result<StepOutput, OperationError> + Send + Sync,
{
    fn execute(&self, input: StepInput<'_>, params: &Params) -> Result<StepOutput, OperationError> {
        self(input, params)
    }
}

/// Passes the upstream artifact through unchanged
pub struct IdentityExecutor;

impl StepExecutor for IdentityExecutor {
    fn execute(&self, input: StepInput<'_>, _params: &Params) -> Result<StepOutput, OperationError> {
        let mut output = StepOutput::artifact(input.artifact());
        if let Some(upstream) = input.upstream {
            output.confluency = upstream.confluency;
            output.histogram = upstream.histogram.clone();
        }
        Ok(output)
    }

    fn metadata(&self, operation_id: &str) -> OperationMetadata {
        OperationMetadata {
            id: operation_id.to_string(),
            name: "Identity".to_string(),
            description: "Passes the input artifact through unchanged".to_string(),
            category: "Utility".to_string(),
            default_params: Params::new(),
        }
    }
}

/// Registry of step executors keyed by operation id
///
/// Populated before pipelines are validated, then shared read-only.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: BTreeMap<String, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor under `operation_id`
    ///
    /// # Errors
    /// Returns `RegistryError::DuplicateOperation` if the id is taken.
    pub fn register<E: StepExecutor + 'static>(
        &mut self,
        operation_id: impl Into<String>,
        executor: E,
    ) -> Result<(), RegistryError> {
        let operation_id = operation_id.into();
        if operation_id.trim().is_empty() {
            return Err(RegistryError::EmptyOperationId);
        }
        if self.executors.contains_key(&operation_id) {
            return Err(RegistryError::DuplicateOperation(operation_id));
        }
        tracing::debug!("Registered operation '{}'", operation_id);
        self.executors.insert(operation_id, Arc::new(executor));
        Ok(())
    }

    /// Gets an executor by operation id
    pub fn get(&self, operation_id: &str) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(operation_id).cloned()
    }

    pub fn contains(&self, operation_id: &str) -> bool {
        self.executors.contains_key(operation_id)
    }

    /// Registered operation ids in sorted order
    pub fn operation_ids(&self) -> Vec<&str> {
        self.executors.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Metadata for one operation
    pub fn metadata(&self, operation_id: &str) -> Option<OperationMetadata> {
        self.executors
            .get(operation_id)
            .map(|executor| executor.metadata(operation_id))
    }

    /// All operations grouped by category, sorted by category then id
    pub fn catalog(&self) -> Vec<OperationCategory> {
        let mut grouped: BTreeMap<String, Vec<OperationMetadata>> = BTreeMap::new();
        for (id, executor) in &self.executors {
            let metadata = executor.metadata(id);
            grouped
                .entry(metadata.category.clone())
                .or_default()
                .push(metadata);
        }

        grouped
            .into_iter()
            .map(|(category, items)| OperationCategory { category, items })
            .collect()
    }
}
