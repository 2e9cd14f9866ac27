//! Core domain types
//!
//! These types describe the analysis pipeline, the images it runs against and
//! the results and reports it produces. They are shared between the engine
//! (for execution), the orchestrator (for batch runs) and the client/CLI.

pub mod batch;
pub mod image;
pub mod operation;
pub mod pipeline;
pub mod result;
