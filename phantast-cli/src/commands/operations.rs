//! Operation catalog and health handlers

use anyhow::Result;
use colored::*;
use phantast_client::OrchestratorClient;

use crate::config::Config;

/// List registered operations grouped by category
pub async fn list_operations(config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);
    let categories = client.list_operations().await?;

    if categories.is_empty() {
        println!("{}", "No operations registered.".yellow());
        return Ok(());
    }

    for category in categories {
        println!("{}", category.category.bold());
        for op in category.items {
            println!("  {} {} {}", "▸".cyan(), op.id.cyan(), format!("({})", op.name).dimmed());
            if !op.description.is_empty() {
                println!("    {}", op.description.dimmed());
            }
            if !op.default_params.is_empty() {
                println!(
                    "    Defaults: {}",
                    serde_json::Value::Object(op.default_params).to_string().dimmed()
                );
            }
        }
        println!();
    }

    Ok(())
}

/// Print the orchestrator health document
pub async fn health(config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);
    let health = client.health().await?;

    println!(
        "{} {}",
        "✓ Orchestrator reachable at".green().bold(),
        client.base_url().cyan()
    );
    println!("{}", serde_json::to_string_pretty(&health)?);

    Ok(())
}
