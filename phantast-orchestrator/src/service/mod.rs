//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between the pipeline store and the batch orchestrator.

pub mod batch;
pub mod pipeline;

// Re-export for convenience
pub use batch as batch_service;
pub use pipeline as pipeline_service;
