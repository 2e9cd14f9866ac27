//! Batch processing
//!
//! Runs a pipeline over every image of an input folder on a bounded worker
//! pool, publishing progress and producing one report per job.

pub mod error;
pub mod orchestrator;

pub use error::BatchError;
pub use orchestrator::{BatchOrchestrator, OrchestratorOptions};
