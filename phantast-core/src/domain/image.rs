//! Image domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// An image that a pipeline runs against
///
/// Immutable once created; its id is part of every cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub filename: String,
    pub path: PathBuf,
    pub dimensions: Dimensions,
    /// Modification time of the file, when read from disk
    pub uploaded_at: DateTime<Utc>,
    /// Size of the file in bytes (0 when unknown)
    #[serde(default)]
    pub size_bytes: u64,
}

/// Pixel dimensions of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Image {
    /// Creates an image descriptor with a random id
    pub fn new(path: impl Into<PathBuf>, dimensions: Dimensions) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            filename,
            path,
            dimensions,
            uploaded_at: Utc::now(),
            size_bytes: 0,
        }
    }

    /// Creates an image descriptor whose id is derived from its path
    ///
    /// Enumerating the same file twice yields the same id.
    pub fn stable(path: impl Into<PathBuf>, dimensions: Dimensions, uploaded_at: DateTime<Utc>) -> Self {
        let path = path.into();
        let mut image = Self::new(path, dimensions);
        image.id = Uuid::new_v5(&Uuid::NAMESPACE_URL, image.path.to_string_lossy().as_bytes());
        image.uploaded_at = uploaded_at;
        image
    }

    /// Records the file size, builder style
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// File name without its extension
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone())
    }
}
