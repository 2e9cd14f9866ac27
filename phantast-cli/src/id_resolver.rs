//! ID resolver module
//!
//! Handles resolution of UUID prefixes to full UUIDs by querying the API.
//! This allows users to specify short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use phantast_client::OrchestratorClient;
use phantast_core::domain::pipeline::Pipeline;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a pipeline ID or prefix to a full UUID
///
/// If the input is already a full UUID, returns it immediately.
/// Otherwise, fetches all pipelines and finds the one matching the prefix.
pub async fn resolve_pipeline_id(
    client: &OrchestratorClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let pipelines = client
        .list_pipelines()
        .await
        .context("Failed to fetch pipelines for ID resolution")?;

    unique_match("pipeline", id_or_prefix, pipelines.iter().map(|p| p.id))
}

/// Resolve a step ID or prefix within a fetched pipeline
pub fn resolve_step_id(pipeline: &Pipeline, id_or_prefix: &IdOrPrefix) -> Result<Uuid> {
    unique_match("step", id_or_prefix, pipeline.steps.iter().map(|s| s.id))
}

/// Picks the single id matched by `id_or_prefix`
///
/// # Errors
/// Returns an error if nothing matches or the prefix is ambiguous.
fn unique_match(
    kind: &str,
    id_or_prefix: &IdOrPrefix,
    ids: impl Iterator<Item = Uuid>,
) -> Result<Uuid> {
    let matches: Vec<Uuid> = ids.filter(|id| id_or_prefix.matches(*id)).collect();

    match matches.as_slice() {
        [] => Err(anyhow!(
            "No {} found with ID starting with '{}'",
            kind,
            id_or_prefix
        )),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple {}s: {}",
                id_or_prefix,
                kind,
                ids.join(", ")
            ))
        }
    }
}
