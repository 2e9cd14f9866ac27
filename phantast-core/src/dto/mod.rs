//! Data Transfer Objects for the orchestrator API
//!
//! Lightweight request and response shapes exchanged between the orchestrator
//! HTTP surface and its clients.

pub mod batch;
pub mod pipeline;
