//! Pipeline Service
//!
//! Business logic for pipeline management and editing.

use phantast_core::domain::pipeline::{Params, Pipeline};
use phantast_core::dto::pipeline::{AddStep, CreatePipeline, PipelineSummary, ValidationReport};
use phantast_engine::{ExecutionOrder, ExecutorRegistry};
use thiserror::Error;
use uuid::Uuid;

use crate::repository::PipelineStore;

/// Service error type
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline {0} not found")]
    NotFound(Uuid),

    #[error("Step {step_id} not found in pipeline {pipeline_id}")]
    StepNotFound { pipeline_id: Uuid, step_id: Uuid },

    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

const MAX_NAME_LEN: usize = 255;

/// Create a new pipeline
pub fn create_pipeline(store: &PipelineStore, req: CreatePipeline) -> Result<Pipeline> {
    validate_pipeline_request(&req)?;

    let pipeline = store.insert(req.into_pipeline());

    tracing::info!("Pipeline created: {} ({})", pipeline.name, pipeline.id);

    Ok(pipeline)
}

/// Get a pipeline by ID
pub fn get_pipeline(store: &PipelineStore, id: Uuid) -> Result<Pipeline> {
    store.find_by_id(id).ok_or(PipelineError::NotFound(id))
}

/// List all pipelines
pub fn list_pipelines(store: &PipelineStore) -> Vec<PipelineSummary> {
    store.list_all().iter().map(PipelineSummary::from).collect()
}

/// Delete a pipeline
pub fn delete_pipeline(store: &PipelineStore, id: Uuid) -> Result<()> {
    if !store.delete(id) {
        return Err(PipelineError::NotFound(id));
    }

    tracing::info!("Pipeline deleted: {}", id);

    Ok(())
}

/// Appends a step for a registered operation
///
/// Without explicit params the operation's default params are used.
pub fn add_step(
    store: &PipelineStore,
    registry: &ExecutorRegistry,
    id: Uuid,
    req: AddStep,
) -> Result<Pipeline> {
    let metadata = registry.metadata(&req.operation_id).ok_or_else(|| {
        PipelineError::Validation(format!("Unknown operation '{}'", req.operation_id))
    })?;

    let name = req.name.unwrap_or(metadata.name);
    let params = req.params.unwrap_or(metadata.default_params);

    edit(store, id, |pipeline| {
        let step_id = pipeline.add_step(req.operation_id, name, params);
        tracing::debug!("Added step {} to pipeline {}", step_id, pipeline.id);
        Ok(())
    })
}

/// Removes a step
pub fn remove_step(store: &PipelineStore, id: Uuid, step_id: Uuid) -> Result<Pipeline> {
    edit(store, id, |pipeline| {
        if pipeline.remove_step(step_id) {
            Ok(())
        } else {
            Err(PipelineError::StepNotFound {
                pipeline_id: id,
                step_id,
            })
        }
    })
}

/// Moves the step at `start_index` to `end_index`, renumbering all orders
pub fn reorder_steps(
    store: &PipelineStore,
    id: Uuid,
    start_index: usize,
    end_index: usize,
) -> Result<Pipeline> {
    edit(store, id, |pipeline| {
        if pipeline.reorder_steps(start_index, end_index) {
            Ok(())
        } else {
            Err(PipelineError::Validation(format!(
                "Cannot move step {} to {}: pipeline has {} step(s)",
                start_index,
                end_index,
                pipeline.steps.len()
            )))
        }
    })
}

/// Enables or disables a step
pub fn toggle_step(store: &PipelineStore, id: Uuid, step_id: Uuid, enabled: bool) -> Result<Pipeline> {
    edit(store, id, |pipeline| {
        if pipeline.toggle_step(step_id, enabled) {
            Ok(())
        } else {
            Err(PipelineError::StepNotFound {
                pipeline_id: id,
                step_id,
            })
        }
    })
}

/// Replaces a step's params
pub fn update_params(store: &PipelineStore, id: Uuid, step_id: Uuid, params: Params) -> Result<Pipeline> {
    edit(store, id, |pipeline| {
        if pipeline.update_params(step_id, params) {
            Ok(())
        } else {
            Err(PipelineError::StepNotFound {
                pipeline_id: id,
                step_id,
            })
        }
    })
}

/// Builds the execution order without running anything
pub fn validate_pipeline(
    store: &PipelineStore,
    registry: &ExecutorRegistry,
    id: Uuid,
) -> Result<ValidationReport> {
    let pipeline = get_pipeline(store, id)?;

    let report = match ExecutionOrder::build(&pipeline, registry) {
        Ok(order) => ValidationReport {
            valid: true,
            execution_order: order.step_ids(),
            error: None,
        },
        Err(e) => ValidationReport {
            valid: false,
            execution_order: Vec::new(),
            error: Some(e.to_string()),
        },
    };

    Ok(report)
}

/// Runs `change` against the stored pipeline and returns the edited copy
fn edit<F>(store: &PipelineStore, id: Uuid, change: F) -> Result<Pipeline>
where
    F: FnOnce(&mut Pipeline) -> Result<()>,
{
    store
        .update(id, |pipeline| change(pipeline).map(|()| pipeline.clone()))
        .ok_or(PipelineError::NotFound(id))?
}

// =============================================================================
// Validation
// =============================================================================

fn validate_pipeline_request(req: &CreatePipeline) -> Result<()> {
    if req.name.trim().is_empty() {
        return Err(PipelineError::Validation(
            "Pipeline name cannot be empty".to_string(),
        ));
    }

    if req.name.len() > MAX_NAME_LEN {
        return Err(PipelineError::Validation(format!(
            "Pipeline name is too long (max {} characters)",
            MAX_NAME_LEN
        )));
    }

    if let Some(idx) = req
        .steps
        .iter()
        .position(|step| step.operation_id.trim().is_empty())
    {
        return Err(PipelineError::Validation(format!(
            "Step {} has an empty operation id",
            idx + 1
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phantast_core::domain::operation::OperationMetadata;
    use phantast_core::domain::result::StepOutput;
    use phantast_core::dto::pipeline::CreateStep;
    use phantast_engine::{IdentityExecutor, OperationError, StepExecutor, StepInput};
    use serde_json::json;

    struct Blur;

    impl StepExecutor for Blur {
        fn execute(
            &self,
            input: StepInput<'_>,
            _params: &Params,
        ) -> std::result::Result<StepOutput, OperationError> {
            Ok(StepOutput::artifact(input.artifact()))
        }

        fn metadata(&self, operation_id: &str) -> OperationMetadata {
            let mut default_params = Params::new();
            default_params.insert("kernel_size".to_string(), json!(5));
            OperationMetadata {
                id: operation_id.to_string(),
                name: "Gaussian Blur".to_string(),
                description: String::new(),
                category: "Preprocessing".to_string(),
                default_params,
            }
        }
    }

    fn registry() -> ExecutorRegistry {
        let mut registry = ExecutorRegistry::new();
        registry.register("identity", IdentityExecutor).unwrap();
        registry.register("gaussian_blur", Blur).unwrap();
        registry
    }

    fn create(store: &PipelineStore, steps: &[&str]) -> Pipeline {
        create_pipeline(
            store,
            CreatePipeline {
                name: "Test Pipeline".to_string(),
                steps: steps
                    .iter()
                    .map(|op| CreateStep {
                        operation_id: op.to_string(),
                        name: None,
                        order: None,
                        enabled: true,
                        params: None,
                    })
                    .collect(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_validate_empty_name() {
        let req = CreatePipeline {
            name: "  ".to_string(),
            steps: vec![],
        };

        let result = validate_pipeline_request(&req);
        assert!(matches!(result, Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_validate_empty_operation_id() {
        let req = CreatePipeline {
            name: "Test".to_string(),
            steps: vec![CreateStep {
                operation_id: "".to_string(),
                name: None,
                order: None,
                enabled: true,
                params: None,
            }],
        };

        let result = validate_pipeline_request(&req);
        assert!(matches!(result, Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_add_step_uses_default_params() {
        let store = PipelineStore::new();
        let pipeline = create(&store, &["identity"]);

        let updated = add_step(
            &store,
            &registry(),
            pipeline.id,
            AddStep {
                operation_id: "gaussian_blur".to_string(),
                name: None,
                params: None,
            },
        )
        .unwrap();

        let added = updated.ordered_steps()[1].clone();
        assert_eq!(added.name, "Gaussian Blur");
        assert_eq!(added.order, 2);
        assert_eq!(added.params["kernel_size"], json!(5));
    }

    #[test]
    fn test_add_step_unknown_operation() {
        let store = PipelineStore::new();
        let pipeline = create(&store, &["identity"]);
        let err = add_step(
            &store,
            &registry(),
            pipeline.id,
            AddStep {
                operation_id: "nope".to_string(),
                name: None,
                params: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn test_step_edits_report_missing_ids() {
        let store = PipelineStore::new();
        let pipeline = create(&store, &["identity"]);
        let missing = Uuid::new_v4();

        assert!(matches!(
            remove_step(&store, pipeline.id, missing),
            Err(PipelineError::StepNotFound { .. })
        ));
        assert!(matches!(
            toggle_step(&store, missing, missing, false),
            Err(PipelineError::NotFound(_))
        ));
        assert!(matches!(
            reorder_steps(&store, pipeline.id, 0, 3),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn test_failed_edit_leaves_pipeline_untouched() {
        let store = PipelineStore::new();
        let pipeline = create(&store, &["identity", "gaussian_blur"]);

        let _ = reorder_steps(&store, pipeline.id, 0, 9);
        assert_eq!(get_pipeline(&store, pipeline.id).unwrap(), pipeline);
    }

    #[test]
    fn test_validate_reports_execution_order() {
        let store = PipelineStore::new();
        let registry = registry();
        let pipeline = create(&store, &["identity", "gaussian_blur"]);
        let first = pipeline.ordered_steps()[0].id;

        let report = validate_pipeline(&store, &registry, pipeline.id).unwrap();
        assert!(report.valid);
        assert_eq!(report.execution_order.len(), 2);

        toggle_step(&store, pipeline.id, first, false).unwrap();
        let report = validate_pipeline(&store, &registry, pipeline.id).unwrap();
        assert_eq!(report.execution_order.len(), 1);

        let broken = create(&store, &["unregistered"]);
        let report = validate_pipeline(&store, &registry, broken.id).unwrap();
        assert!(!report.valid);
        assert!(report.error.unwrap().contains("unregistered"));
    }

    #[test]
    fn test_reorder_and_delete() {
        let store = PipelineStore::new();
        let pipeline = create(&store, &["identity", "gaussian_blur"]);

        let reordered = reorder_steps(&store, pipeline.id, 1, 0).unwrap();
        let ops: Vec<&str> = reordered
            .ordered_steps()
            .iter()
            .map(|s| s.operation_id.as_str())
            .collect();
        assert_eq!(ops, vec!["gaussian_blur", "identity"]);

        delete_pipeline(&store, pipeline.id).unwrap();
        assert!(matches!(
            delete_pipeline(&store, pipeline.id),
            Err(PipelineError::NotFound(_))
        ));
        assert!(list_pipelines(&store).is_empty());
    }
}
