//! Batch command handlers
//!
//! Starts and cancels batch runs over image folders, shows progress and
//! reports, and edits the output rendering options.

use anyhow::Result;
use clap::{ArgAction, Subcommand};
use colored::*;
use phantast_core::domain::batch::{BatchConfig, BatchState, JobReport, OutputFormat, ProgressState};
use phantast_core::dto::batch::StartBatch;
use std::io::Write;
use std::path::PathBuf;

use crate::config::Config;
use crate::id_resolver::resolve_pipeline_id;
use crate::types::IdOrPrefix;
use phantast_client::OrchestratorClient;

const BAR_WIDTH: usize = 40;

/// Batch subcommands
#[derive(Subcommand)]
pub enum BatchCommands {
    /// Run a pipeline over every image in a folder
    Start {
        /// Pipeline ID or unambiguous prefix
        pipeline: String,

        /// Folder holding the input images
        input: PathBuf,

        /// Output folder (defaults to a sub-folder of the input folder)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Follow progress until the job finishes
        #[arg(short, long)]
        watch: bool,
    },
    /// Stop the running job after the files already in flight
    Cancel,
    /// Show live progress
    Progress,
    /// Show the orchestrator state and active job
    Status,
    /// Show the report of the last finished job
    Report,
    /// Follow progress until the running job finishes
    Watch,
    /// Show the output rendering options
    Config,
    /// Change output rendering options (only while no job runs)
    SetConfig {
        #[arg(long, action = ArgAction::Set)]
        add_header: Option<bool>,

        #[arg(long)]
        header_height: Option<u32>,

        #[arg(long, action = ArgAction::Set)]
        include_parameters: Option<bool>,

        #[arg(long, action = ArgAction::Set)]
        include_confluency: Option<bool>,

        /// JPG, PNG or TIFF
        #[arg(long)]
        format: Option<OutputFormat>,
    },
}

/// Handle batch commands
pub async fn handle_batch_command(command: BatchCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        BatchCommands::Start {
            pipeline,
            input,
            output,
            watch,
        } => {
            start(&client, &pipeline, input, output).await?;
            if watch {
                watch_progress(&client, config).await?;
            }
            Ok(())
        }
        BatchCommands::Cancel => cancel(&client).await,
        BatchCommands::Progress => {
            let progress = client.batch_progress().await?;
            print_progress(&progress);
            Ok(())
        }
        BatchCommands::Status => status(&client).await,
        BatchCommands::Report => report(&client).await,
        BatchCommands::Watch => watch_progress(&client, config).await,
        BatchCommands::Config => {
            let current = client.batch_config().await?;
            print_config(&current);
            Ok(())
        }
        BatchCommands::SetConfig {
            add_header,
            header_height,
            include_parameters,
            include_confluency,
            format,
        } => {
            let mut updated = client.batch_config().await?;
            if let Some(value) = add_header {
                updated.add_header = value;
            }
            if let Some(value) = header_height {
                updated.header_height = value;
            }
            if let Some(value) = include_parameters {
                updated.include_parameters = value;
            }
            if let Some(value) = include_confluency {
                updated.include_confluency = value;
            }
            if let Some(value) = format {
                updated.output_format = value;
            }

            let saved = client.update_batch_config(&updated).await?;
            println!("{}", "✓ Batch config updated.".green().bold());
            print_config(&saved);
            Ok(())
        }
    }
}

async fn start(
    client: &OrchestratorClient,
    pipeline: &str,
    input_folder: PathBuf,
    output_folder: Option<PathBuf>,
) -> Result<()> {
    let pipeline_id = resolve_pipeline_id(client, &IdOrPrefix::parse(pipeline)).await?;

    let job = client
        .start_batch(StartBatch {
            input_folder,
            pipeline_id,
            output_folder,
        })
        .await?;

    println!("{}", "✓ Batch job started!".green().bold());
    println!("  Job ID:   {}", job.id.to_string().cyan());
    println!("  Pipeline: {}", job.pipeline_id.to_string().dimmed());
    println!("  Input:    {}", job.input_folder.display());
    println!("  Output:   {}", job.output_folder.display());
    println!("  Files:    {}", job.total_files.to_string().bold());

    Ok(())
}

async fn cancel(client: &OrchestratorClient) -> Result<()> {
    match client.cancel_batch().await {
        Ok(()) => {
            println!("{}", "✓ Cancellation requested.".yellow().bold());
            Ok(())
        }
        Err(e) if e.is_conflict() => {
            println!("{}", "No batch job is running.".yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn status(client: &OrchestratorClient) -> Result<()> {
    let status = client.batch_status().await?;

    println!("{}", "Batch Status:".bold());
    println!("  State: {}", colored_state(status.state));
    if let Some(job) = &status.active_job {
        println!("  Job:   {}", job.id.to_string().cyan());
        println!("  Input: {}", job.input_folder.display());
        println!("  Output: {}", job.output_folder.display());
    }
    println!();
    print_progress(&status.progress);

    Ok(())
}

async fn report(client: &OrchestratorClient) -> Result<()> {
    match client.batch_report().await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            println!("{}", "No batch job has finished yet.".yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Polls progress until the job stops processing, then prints the report
async fn watch_progress(client: &OrchestratorClient, config: &Config) -> Result<()> {
    let mut ticker = tokio::time::interval(config.poll_interval);

    loop {
        ticker.tick().await;
        let progress = client.batch_progress().await?;

        print!("\r{}", progress_line(&progress));
        std::io::stdout().flush()?;

        if !progress.is_processing {
            println!();
            break;
        }
    }

    report(client).await
}

fn progress_line(progress: &ProgressState) -> String {
    format!(
        "{} {:>5.1}% [{}/{}] {}",
        progress_bar(progress.percent_complete, BAR_WIDTH),
        progress.percent_complete,
        progress.current_file_index,
        progress.total_files,
        progress.status_message
    )
}

/// Renders `percent` as a fixed-width bar
fn progress_bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn colored_state(state: BatchState) -> ColoredString {
    match state {
        BatchState::Idle => state.to_string().dimmed(),
        BatchState::Running => state.to_string().cyan().bold(),
        BatchState::Completed => state.to_string().green().bold(),
        BatchState::Cancelled => state.to_string().yellow().bold(),
    }
}

fn print_progress(progress: &ProgressState) {
    println!("{}", "Progress:".bold());
    println!("  {}", progress_line(progress));
    if !progress.current_filename.is_empty() {
        println!("  Current: {}", progress.current_filename.dimmed());
    }
}

fn print_report(report: &JobReport) {
    println!("{}", "Batch Report:".bold());
    println!("  Job:       {}", report.job_id.to_string().cyan());
    println!("  Outcome:   {}", colored_state(report.outcome));
    println!(
        "  Finished:  {}",
        report.completed_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Succeeded: {}", report.success_count.to_string().green());
    if report.failure_count > 0 {
        println!("  Failed:    {}", report.failure_count.to_string().red());
        for file in &report.failed_files {
            println!("    {} {}", "✗".red(), file);
        }
    } else {
        println!("  Failed:    {}", "0".dimmed());
    }
}

fn print_config(config: &BatchConfig) {
    println!("{}", "Batch Config:".bold());
    println!("  Add header:         {}", config.add_header);
    println!("  Header height:      {}", config.header_height);
    println!("  Include parameters: {}", config.include_parameters);
    println!("  Include confluency: {}", config.include_confluency);
    println!("  Output format:      {}", config.output_format.to_string().cyan());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_bounds() {
        assert_eq!(progress_bar(0.0, 10), "░".repeat(10));
        assert_eq!(progress_bar(100.0, 10), "█".repeat(10));
        assert_eq!(progress_bar(250.0, 4), "█".repeat(4));
        assert_eq!(progress_bar(50.0, 4), format!("{}{}", "█".repeat(2), "░".repeat(2)));
    }

    #[test]
    fn test_progress_line_mentions_counts() {
        let progress = ProgressState {
            is_processing: true,
            current_file_index: 3,
            total_files: 10,
            current_filename: "file_03.png".to_string(),
            percent_complete: 20.0,
            status_message: "Processing file_03.png".to_string(),
        };
        let line = progress_line(&progress);
        assert!(line.contains("20.0%"));
        assert!(line.contains("[3/10]"));
        assert!(line.contains("Processing file_03.png"));
    }
}
