//! Phantast Orchestrator
//!
//! Batch processing service for the Phantast image-analysis engine.
//!
//! Architecture:
//! - Configuration: settings from environment or defaults
//! - Repository: in-memory pipeline storage
//! - Services: pipeline editing and batch start-up
//! - Batch: the orchestrator state machine and its worker pool
//! - I/O: folder enumeration and output rendering
//! - API: axum HTTP surface over all of the above

pub mod api;
pub mod batch;
pub mod config;
pub mod io;
pub mod repository;
pub mod service;

pub use api::{AppState, create_router};
pub use batch::{BatchError, BatchOrchestrator, OrchestratorOptions};
pub use config::Config;
