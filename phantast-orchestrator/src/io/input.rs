//! Folder enumeration
//!
//! Turns an input folder into the ordered list of images a batch job runs
//! over.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use phantast_core::domain::image::{Dimensions, Image};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// File extensions picked up by [`FsInputSource`] (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// The input folder could not produce any images
#[derive(Debug, Error)]
pub enum InputEnumerationError {
    #[error("cannot read input folder {folder}: {reason}")]
    Unreadable { folder: PathBuf, reason: String },

    #[error("no image files found in {0}")]
    Empty(PathBuf),
}

/// Produces a deterministic, finite sequence of images for a folder
#[async_trait]
pub trait InputSource: Send + Sync {
    async fn enumerate(&self, folder: &Path) -> Result<Vec<Image>, InputEnumerationError>;
}

/// Enumerates image files directly inside a local folder
///
/// Files are sorted by name. Image ids derive from the canonical path, so
/// enumerating the same folder twice reuses cached results.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsInputSource;

#[async_trait]
impl InputSource for FsInputSource {
    async fn enumerate(&self, folder: &Path) -> Result<Vec<Image>, InputEnumerationError> {
        let folder = folder.to_path_buf();
        let task_folder = folder.clone();
        tokio::task::spawn_blocking(move || list_images(&task_folder))
            .await
            .map_err(|e| InputEnumerationError::Unreadable {
                folder,
                reason: e.to_string(),
            })?
    }
}

fn list_images(folder: &Path) -> Result<Vec<Image>, InputEnumerationError> {
    let unreadable = |e: std::io::Error| InputEnumerationError::Unreadable {
        folder: folder.to_path_buf(),
        reason: e.to_string(),
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(folder).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let path = entry.path();
        if path.is_file() && has_image_extension(&path) {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        return Err(InputEnumerationError::Empty(folder.to_path_buf()));
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!("Found {} image(s) in {}", paths.len(), folder.display());

    Ok(paths.into_iter().map(describe).collect())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn describe(path: PathBuf) -> Image {
    let path = std::fs::canonicalize(&path).unwrap_or(path);

    // An unreadable header does not stop enumeration; the file fails once a
    // step tries to read it.
    let dimensions = match image::image_dimensions(&path) {
        Ok((width, height)) => Dimensions { width, height },
        Err(e) => {
            warn!("Cannot read dimensions of {}: {}", path.display(), e);
            Dimensions { width: 0, height: 0 }
        }
    };

    let metadata = std::fs::metadata(&path).ok();
    let uploaded_at = metadata
        .as_ref()
        .and_then(|meta| meta.modified().ok())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(Utc::now);
    let size_bytes = metadata.map_or(0, |meta| meta.len());

    Image::stable(path, dimensions, uploaded_at).with_size(size_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) {
        RgbImage::from_pixel(width, height, Rgb([10, 20, 30]))
            .save(dir.join(name))
            .unwrap();
    }

    #[tokio::test]
    async fn test_enumerates_sorted_images_only() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b.png", 4, 3);
        write_png(dir.path(), "a.PNG", 2, 2);
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let images = FsInputSource.enumerate(dir.path()).await.unwrap();
        let names: Vec<&str> = images.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, vec!["a.PNG", "b.png"]);
        assert_eq!(images[1].dimensions, Dimensions { width: 4, height: 3 });
    }

    #[tokio::test]
    async fn test_ids_are_stable_across_enumerations() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "cells.png", 2, 2);

        let first = FsInputSource.enumerate(dir.path()).await.unwrap();
        let second = FsInputSource.enumerate(dir.path()).await.unwrap();
        assert_eq!(first[0].id, second[0].id);
    }

    #[tokio::test]
    async fn test_rewritten_file_changes_revision() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "cells.png", 2, 2);
        let before = FsInputSource.enumerate(dir.path()).await.unwrap().remove(0);

        RgbImage::from_pixel(2, 2, Rgb([200, 200, 200]))
            .save(dir.path().join("cells.png"))
            .unwrap();
        let file = std::fs::File::options()
            .write(true)
            .open(dir.path().join("cells.png"))
            .unwrap();
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(5))
            .unwrap();

        let after = FsInputSource.enumerate(dir.path()).await.unwrap().remove(0);
        assert_eq!(before.id, after.id);
        assert_ne!(before.uploaded_at, after.uploaded_at);
        assert!(after.size_bytes > 0);
    }

    #[tokio::test]
    async fn test_empty_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.md"), "no images").unwrap();

        let err = FsInputSource.enumerate(dir.path()).await.unwrap_err();
        assert!(matches!(err, InputEnumerationError::Empty(_)));
    }

    #[tokio::test]
    async fn test_missing_folder_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsInputSource
            .enumerate(&dir.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, InputEnumerationError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_image_is_still_listed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

        let images = FsInputSource.enumerate(dir.path()).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].dimensions, Dimensions { width: 0, height: 0 });
    }
}
