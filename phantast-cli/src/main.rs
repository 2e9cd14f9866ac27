//! Phantast CLI
//!
//! Command-line interface for the Phantast orchestrator: build pipelines,
//! run them over folders of images and follow the results.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "phantast")]
#[command(about = "Phantast image-analysis pipeline CLI", long_about = None)]
struct Cli {
    /// Orchestrator URL
    #[arg(
        long,
        env = "PHANTAST_ORCHESTRATOR_URL",
        default_value = "http://localhost:8080"
    )]
    orchestrator_url: String,

    /// Poll interval in milliseconds for watching progress
    #[arg(long, default_value = "500")]
    poll_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        orchestrator_url: cli.orchestrator_url,
        poll_interval: Duration::from_millis(cli.poll_ms.max(50)),
    };

    handle_command(cli.command, &config).await
}
