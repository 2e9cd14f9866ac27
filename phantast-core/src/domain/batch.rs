//! Batch workflow domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Output rendering options for a batch run
///
/// Read once when a job starts; never changed while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub add_header: bool,
    pub header_height: u32,
    pub include_parameters: bool,
    pub include_confluency: bool,
    pub output_format: OutputFormat,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            add_header: false,
            header_height: 80,
            include_parameters: true,
            include_confluency: true,
            output_format: OutputFormat::Png,
        }
    }
}

/// Encoding used for rendered output images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "JPG")]
    Jpg,
    #[serde(rename = "PNG")]
    Png,
    #[serde(rename = "TIFF")]
    Tiff,
}

impl OutputFormat {
    /// File extension written for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Tiff => "tiff",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Jpg => write!(f, "JPG"),
            OutputFormat::Png => write!(f, "PNG"),
            OutputFormat::Tiff => write!(f, "TIFF"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JPG" | "JPEG" => Ok(OutputFormat::Jpg),
            "PNG" => Ok(OutputFormat::Png),
            "TIF" | "TIFF" => Ok(OutputFormat::Tiff),
            other => Err(format!("unsupported output format: {}", other)),
        }
    }
}

/// A batch run of one pipeline over one input folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub total_files: usize,
}

/// Live progress of the running job
///
/// Overwritten after every file-level transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub is_processing: bool,
    /// Highest index (1-based) of a file that has started
    pub current_file_index: usize,
    pub total_files: usize,
    pub current_filename: String,
    pub percent_complete: f64,
    pub status_message: String,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            is_processing: false,
            current_file_index: 0,
            total_files: 0,
            current_filename: String::new(),
            percent_complete: 0.0,
            status_message: "Idle".to_string(),
        }
    }
}

/// Final record of a finished batch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub outcome: BatchState,
    pub success_count: usize,
    pub failure_count: usize,
    /// Names of failed files in completion order
    pub failed_files: Vec<String>,
}

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl BatchState {
    /// Whether a new job may start (or config change) from this state
    pub fn is_resting(&self) -> bool {
        !matches!(self, BatchState::Running)
    }
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchState::Idle => write!(f, "Idle"),
            BatchState::Running => write!(f, "Running"),
            BatchState::Completed => write!(f, "Completed"),
            BatchState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_serde_names() {
        assert_eq!(
            serde_json::to_string(&OutputFormat::Tiff).unwrap(),
            "\"TIFF\""
        );
        let parsed: OutputFormat = serde_json::from_str("\"JPG\"").unwrap();
        assert_eq!(parsed, OutputFormat::Jpg);
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("jpeg".parse::<OutputFormat>(), Ok(OutputFormat::Jpg));
        assert_eq!("tif".parse::<OutputFormat>(), Ok(OutputFormat::Tiff));
        assert!("gif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_resting_states() {
        assert!(BatchState::Idle.is_resting());
        assert!(BatchState::Completed.is_resting());
        assert!(BatchState::Cancelled.is_resting());
        assert!(!BatchState::Running.is_resting());
    }
}
