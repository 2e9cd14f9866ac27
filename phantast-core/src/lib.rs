//! Phantast Core
//!
//! Core types shared by the Phantast image-analysis services.
//!
//! This crate contains:
//! - Domain types: pipelines, images, step results and batch jobs
//! - DTOs: request/response shapes used between the orchestrator, client and CLI

pub mod domain;
pub mod dto;
