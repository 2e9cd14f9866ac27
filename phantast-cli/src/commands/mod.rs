//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod batch;
mod operations;
mod pipeline;

pub use batch::BatchCommands;
pub use pipeline::PipelineCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline management and step editing
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Batch processing of an image folder
    Batch {
        #[command(subcommand)]
        command: BatchCommands,
    },
    /// List registered operations
    Operations,
    /// Check that the orchestrator is reachable
    Health,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Batch { command } => batch::handle_batch_command(command, config).await,
        Commands::Operations => operations::list_operations(config).await,
        Commands::Health => operations::health(config).await,
    }
}
