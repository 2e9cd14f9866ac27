//! Repository Module
//!
//! Storage layer for the orchestrator. Pipelines live in memory for the
//! lifetime of the process.

pub mod pipeline;

// Re-export for convenience
pub use pipeline::PipelineStore;
