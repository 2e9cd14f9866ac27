//! Pipeline command handlers
//!
//! Handles pipeline creation, listing, viewing, deletion and the step
//! editing operations (add, remove, reorder, toggle, set params, validate).

use anyhow::{Context, Result};
use clap::{ArgAction, Subcommand};
use colored::*;
use phantast_core::domain::pipeline::{Params, Pipeline};
use phantast_core::dto::pipeline::{AddStep, CreatePipeline, CreateStep, PipelineSummary};
use serde_json::Value;

use crate::config::Config;
use crate::id_resolver::{resolve_pipeline_id, resolve_step_id};
use crate::types::{IdOrPrefix, parse_param};
use phantast_client::OrchestratorClient;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Create a new pipeline
    Create {
        /// Pipeline name (overrides the name in --file)
        #[arg(short, long)]
        name: Option<String>,

        /// Operation ids to add as steps, in order
        #[arg(short, long = "step")]
        steps: Vec<String>,

        /// JSON file holding a full create request
        #[arg(short, long)]
        file: Option<String>,
    },
    /// List all pipelines
    List,
    /// Get pipeline details
    Get {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
    /// Delete a pipeline
    Delete {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
    /// Append a step
    AddStep {
        /// Pipeline ID or unambiguous prefix
        id: String,

        /// Registered operation id
        operation: String,

        /// Step display name (defaults to the operation name)
        #[arg(short, long)]
        name: Option<String>,

        /// Parameters as key=value pairs (defaults to the operation defaults)
        #[arg(short, long, value_parser = parse_param)]
        param: Vec<(String, Value)>,
    },
    /// Remove a step
    RemoveStep {
        /// Pipeline ID or unambiguous prefix
        id: String,

        /// Step ID or unambiguous prefix
        step: String,
    },
    /// Move the step at position FROM to position TO (0-based)
    Reorder {
        /// Pipeline ID or unambiguous prefix
        id: String,
        from: usize,
        to: usize,
    },
    /// Enable or disable a step
    Toggle {
        /// Pipeline ID or unambiguous prefix
        id: String,

        /// Step ID or unambiguous prefix
        step: String,

        /// true to enable, false to disable
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Replace a step's parameters
    SetParams {
        /// Pipeline ID or unambiguous prefix
        id: String,

        /// Step ID or unambiguous prefix
        step: String,

        /// Parameters as key=value pairs
        #[arg(short, long, value_parser = parse_param)]
        param: Vec<(String, Value)>,

        /// Parameters as a JSON object (merged under --param)
        #[arg(long)]
        json: Option<String>,
    },
    /// Check a pipeline against the registered operations
    Validate {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
}

/// Handle pipeline commands
pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        PipelineCommands::Create { name, steps, file } => {
            create_pipeline(&client, name, steps, file).await
        }
        PipelineCommands::List => list_pipelines(&client).await,
        PipelineCommands::Get { id } => get_pipeline(&client, &id).await,
        PipelineCommands::Delete { id } => delete_pipeline(&client, &id).await,
        PipelineCommands::AddStep {
            id,
            operation,
            name,
            param,
        } => add_step(&client, &id, operation, name, param).await,
        PipelineCommands::RemoveStep { id, step } => remove_step(&client, &id, &step).await,
        PipelineCommands::Reorder { id, from, to } => reorder(&client, &id, from, to).await,
        PipelineCommands::Toggle { id, step, enabled } => {
            toggle(&client, &id, &step, enabled).await
        }
        PipelineCommands::SetParams {
            id,
            step,
            param,
            json,
        } => set_params(&client, &id, &step, param, json).await,
        PipelineCommands::Validate { id } => validate(&client, &id).await,
    }
}

async fn create_pipeline(
    client: &OrchestratorClient,
    name: Option<String>,
    steps: Vec<String>,
    file: Option<String>,
) -> Result<()> {
    let mut req = match file {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read pipeline file: {}", path))?;
            serde_json::from_str::<CreatePipeline>(&content)
                .with_context(|| format!("Invalid pipeline definition in {}", path))?
        }
        None => CreatePipeline {
            name: String::new(),
            steps: Vec::new(),
        },
    };

    if let Some(name) = name {
        req.name = name;
    }
    if req.name.trim().is_empty() {
        anyhow::bail!("A pipeline name is required (--name or \"name\" in --file)");
    }
    req.steps.extend(steps.into_iter().map(|operation_id| CreateStep {
        operation_id,
        name: None,
        order: None,
        enabled: true,
        params: None,
    }));

    let pipeline = client.create_pipeline(req).await?;

    println!("{}", "✓ Pipeline created successfully!".green().bold());
    println!("  ID:    {}", pipeline.id.to_string().cyan());
    println!("  Name:  {}", pipeline.name.bold());
    println!("  Steps: {}", pipeline.steps.len().to_string().dimmed());

    Ok(())
}

async fn list_pipelines(client: &OrchestratorClient) -> Result<()> {
    let pipelines = client.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} pipeline(s):", pipelines.len()).bold()
        );
        println!();
        for pipeline in pipelines {
            print_pipeline_summary(&pipeline);
        }
    }

    Ok(())
}

async fn get_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(id)).await?;
    let pipeline = client.get_pipeline(uuid).await?;

    print_pipeline_details(&pipeline);

    Ok(())
}

async fn delete_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(id)).await?;

    client.delete_pipeline(uuid).await?;

    println!(
        "{}",
        format!("✓ Pipeline {} deleted successfully!", uuid)
            .green()
            .bold()
    );

    Ok(())
}

async fn add_step(
    client: &OrchestratorClient,
    id: &str,
    operation_id: String,
    name: Option<String>,
    params: Vec<(String, Value)>,
) -> Result<()> {
    let uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(id)).await?;

    let params = (!params.is_empty()).then(|| params.into_iter().collect::<Params>());
    let pipeline = client
        .add_step(
            uuid,
            AddStep {
                operation_id,
                name,
                params,
            },
        )
        .await?;

    println!("{}", "✓ Step added.".green().bold());
    print_steps(&pipeline);

    Ok(())
}

async fn remove_step(client: &OrchestratorClient, id: &str, step: &str) -> Result<()> {
    let (pipeline_id, step_id) = resolve_step(client, id, step).await?;
    let pipeline = client.remove_step(pipeline_id, step_id).await?;

    println!("{}", format!("✓ Step {} removed.", step_id).green().bold());
    print_steps(&pipeline);

    Ok(())
}

async fn reorder(client: &OrchestratorClient, id: &str, from: usize, to: usize) -> Result<()> {
    let uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(id)).await?;
    let pipeline = client.reorder_steps(uuid, from, to).await?;

    println!("{}", format!("✓ Moved step {} to {}.", from, to).green().bold());
    print_steps(&pipeline);

    Ok(())
}

async fn toggle(client: &OrchestratorClient, id: &str, step: &str, enabled: bool) -> Result<()> {
    let (pipeline_id, step_id) = resolve_step(client, id, step).await?;
    let pipeline = client.toggle_step(pipeline_id, step_id, enabled).await?;

    let verb = if enabled { "enabled" } else { "disabled" };
    println!("{}", format!("✓ Step {} {}.", step_id, verb).green().bold());
    print_steps(&pipeline);

    Ok(())
}

async fn set_params(
    client: &OrchestratorClient,
    id: &str,
    step: &str,
    pairs: Vec<(String, Value)>,
    json: Option<String>,
) -> Result<()> {
    let params = build_params(pairs, json.as_deref())?;
    let (pipeline_id, step_id) = resolve_step(client, id, step).await?;
    let pipeline = client.update_params(pipeline_id, step_id, &params).await?;

    println!("{}", format!("✓ Parameters of step {} updated.", step_id).green().bold());
    print_steps(&pipeline);

    Ok(())
}

async fn validate(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(id)).await?;
    let report = client.validate_pipeline(uuid).await?;

    if report.valid {
        println!("{}", "✓ Pipeline is valid.".green().bold());
        println!("  Execution order:");
        for (position, step_id) in report.execution_order.iter().enumerate() {
            println!("    {}. {}", position + 1, step_id.to_string().dimmed());
        }
    } else {
        println!("{}", "✗ Pipeline is invalid.".red().bold());
        if let Some(error) = report.error {
            println!("  {}", error.red());
        }
    }

    Ok(())
}

/// Resolves a pipeline and one of its steps from ids or prefixes
async fn resolve_step(
    client: &OrchestratorClient,
    id: &str,
    step: &str,
) -> Result<(uuid::Uuid, uuid::Uuid)> {
    let pipeline_id = resolve_pipeline_id(client, &IdOrPrefix::parse(id)).await?;
    let pipeline = client.get_pipeline(pipeline_id).await?;
    let step_id = resolve_step_id(&pipeline, &IdOrPrefix::parse(step))?;
    Ok((pipeline_id, step_id))
}

/// Merges a JSON object with key=value pairs; pairs win
fn build_params(pairs: Vec<(String, Value)>, json: Option<&str>) -> Result<Params> {
    let mut params = match json {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("Invalid --json value")? {
            Value::Object(map) => map,
            _ => anyhow::bail!("--json must be a JSON object"),
        },
        None => Params::new(),
    };
    params.extend(pairs);
    Ok(params)
}

fn print_pipeline_summary(pipeline: &PipelineSummary) {
    println!("  {} {}", "▸".cyan(), pipeline.name.bold());
    println!("    ID:      {}", pipeline.id.to_string().dimmed());
    println!(
        "    Steps:   {}",
        format!("{} ({} enabled)", pipeline.step_count, pipeline.enabled_step_count).dimmed()
    );
    println!(
        "    Updated: {}",
        pipeline
            .updated_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_pipeline_details(pipeline: &Pipeline) {
    println!("{}", "Pipeline Details:".bold());
    println!("  ID:      {}", pipeline.id.to_string().cyan());
    println!("  Name:    {}", pipeline.name.bold());
    println!(
        "  Created: {}",
        pipeline.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated: {}",
        pipeline.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!();
    print_steps(pipeline);
}

fn print_steps(pipeline: &Pipeline) {
    println!("{}", "Steps:".bold());
    println!("{}", "─".repeat(80).dimmed());
    if pipeline.steps.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (position, step) in pipeline.ordered_steps().into_iter().enumerate() {
        let marker = if step.enabled {
            "●".green()
        } else {
            "○".dimmed()
        };
        println!(
            "  {} {:>2}. {} {} {}",
            marker,
            position,
            step.name.bold(),
            format!("[{}]", step.operation_id).cyan(),
            step.id.to_string().dimmed()
        );
        if !step.params.is_empty() {
            println!(
                "        {}",
                Value::Object(step.params.clone()).to_string().dimmed()
            );
        }
    }
    println!("{}", "─".repeat(80).dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_params_merges_pairs_over_json() {
        let params = build_params(
            vec![("sigma".to_string(), json!(2))],
            Some(r#"{"sigma": 1, "method": "otsu"}"#),
        )
        .unwrap();

        assert_eq!(params["sigma"], json!(2));
        assert_eq!(params["method"], json!("otsu"));
    }

    #[test]
    fn test_build_params_rejects_non_objects() {
        assert!(build_params(vec![], Some("[1, 2]")).is_err());
        assert!(build_params(vec![], Some("{oops")).is_err());
        assert!(build_params(vec![], None).unwrap().is_empty());
    }
}
