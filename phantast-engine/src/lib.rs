//! Phantast Engine
//!
//! Pipeline execution and caching for the Phantast image-analysis services.
//!
//! This crate provides:
//! - A registry mapping operation ids to pluggable step executors
//! - Content fingerprints for step invocations
//! - A shared, bounded result cache keyed by image and fingerprint
//! - Validation and linearization of pipelines into an execution order
//! - A runner that walks the execution order lazily, reusing cached work

pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod registry;
pub mod runner;

pub use cache::{CacheLimits, CacheStats, PinnedResult, ResultCache};
pub use error::{FingerprintError, OperationError, RegistryError, StepError, ValidationError};
pub use fingerprint::{Fingerprint, compute_fingerprint};
pub use graph::ExecutionOrder;
pub use registry::{ExecutorRegistry, IdentityExecutor, StepExecutor, StepInput};
pub use runner::{Comparison, ImageRun, PipelineRunner, StepEvent, StepRun};
