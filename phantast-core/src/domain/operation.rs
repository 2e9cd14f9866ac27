//! Operation catalog types

use serde::{Deserialize, Serialize};

use crate::domain::pipeline::Params;

/// Describes an operation that pipeline steps can select
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub default_params: Params,
}

/// Operations grouped for display in a catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCategory {
    pub category: String,
    pub items: Vec<OperationMetadata>,
}
