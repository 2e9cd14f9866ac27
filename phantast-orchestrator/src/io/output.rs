//! Output writer
//!
//! Renders the final result of a file's pipeline run into the job's output
//! folder. Write failures count as file failures.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use phantast_core::domain::batch::{BatchConfig, OutputFormat};
use phantast_core::domain::image::Image;
use phantast_core::domain::pipeline::{Params, PipelineStep};
use phantast_core::domain::result::StepResult;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot encode sidecar: {0}")]
    Sidecar(#[from] serde_json::Error),

    #[error("output worker failed: {0}")]
    Worker(String),

    #[error("header of {header} px does not fit above a {body} px image")]
    HeaderTooTall { header: u32, body: u32 },
}

/// Everything needed to render one file's output
#[derive(Debug, Clone, Copy)]
pub struct OutputRequest<'a> {
    pub image: &'a Image,
    /// File name (without extension) to write, unique within the job
    pub output_name: &'a str,
    /// Result of the last executed step
    pub result: &'a StepResult,
    /// Executed steps, in order
    pub steps: &'a [PipelineStep],
    pub config: &'a BatchConfig,
    pub output_folder: &'a Path,
}

#[async_trait]
pub trait OutputWriter: Send + Sync {
    /// Writes the rendered artifact and returns its path
    async fn write(&self, request: OutputRequest<'_>) -> Result<PathBuf, OutputError>;
}

/// Writes rendered images (and optional JSON sidecars) to local folders
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOutputWriter;

#[derive(Serialize)]
struct Sidecar {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    confluency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<Vec<SidecarStep>>,
}

#[derive(Serialize)]
struct SidecarStep {
    step_id: Uuid,
    operation_id: String,
    name: String,
    params: Params,
}

struct RenderJob {
    source: PathBuf,
    stem: String,
    filename: String,
    confluency: Option<f64>,
    steps: Vec<SidecarStep>,
    config: BatchConfig,
    output_folder: PathBuf,
}

#[async_trait]
impl OutputWriter for FileOutputWriter {
    async fn write(&self, request: OutputRequest<'_>) -> Result<PathBuf, OutputError> {
        let job = RenderJob {
            source: PathBuf::from(&request.result.image_url),
            stem: request.output_name.to_string(),
            filename: request.image.filename.clone(),
            confluency: request.result.confluency,
            steps: request
                .steps
                .iter()
                .map(|step| SidecarStep {
                    step_id: step.id,
                    operation_id: step.operation_id.clone(),
                    name: step.name.clone(),
                    params: step.params.clone(),
                })
                .collect(),
            config: request.config.clone(),
            output_folder: request.output_folder.to_path_buf(),
        };

        tokio::task::spawn_blocking(move || render(job))
            .await
            .map_err(|e| OutputError::Worker(e.to_string()))?
    }
}

/// Picks a distinct output name for every image of a job
///
/// Names are the file stems. Stems shared by several inputs (`well.png` and
/// `well.tif`) keep their source extension (`well_png`, `well_tif`), and any
/// name still taken gets a numeric suffix. Comparison ignores ASCII case.
pub fn output_names(images: &[Image]) -> Vec<String> {
    let mut stem_counts: HashMap<String, usize> = HashMap::new();
    for image in images {
        *stem_counts.entry(image.stem().to_ascii_lowercase()).or_default() += 1;
    }

    let mut taken = HashSet::new();
    images
        .iter()
        .map(|image| {
            let stem = image.stem();
            let base = if stem_counts[&stem.to_ascii_lowercase()] > 1 {
                match image.path.extension() {
                    Some(ext) => format!("{}_{}", stem, ext.to_string_lossy()),
                    None => stem,
                }
            } else {
                stem
            };

            let mut name = base.clone();
            let mut suffix = 2;
            while !taken.insert(name.to_ascii_lowercase()) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            name
        })
        .collect()
}

fn render(job: RenderJob) -> Result<PathBuf, OutputError> {
    let source = image::open(&job.source)?;

    let rendered = if job.config.add_header && job.config.header_height > 0 {
        with_header(&source, job.config.header_height)?
    } else {
        source
    };

    // JPEG carries no alpha channel
    let rendered = match job.config.output_format {
        OutputFormat::Jpg => DynamicImage::ImageRgb8(rendered.to_rgb8()),
        OutputFormat::Png | OutputFormat::Tiff => rendered,
    };

    std::fs::create_dir_all(&job.output_folder)?;
    let path = job.output_folder.join(format!(
        "{}.{}",
        job.stem,
        job.config.output_format.extension()
    ));
    rendered.save_with_format(&path, image_format(job.config.output_format))?;

    if job.config.include_parameters || job.config.include_confluency {
        let sidecar = Sidecar {
            image: job.filename,
            confluency: job.confluency.filter(|_| job.config.include_confluency),
            steps: job.config.include_parameters.then_some(job.steps),
        };
        let sidecar_path = job.output_folder.join(format!("{}.json", job.stem));
        std::fs::write(sidecar_path, serde_json::to_vec_pretty(&sidecar)?)?;
    }

    tracing::debug!("Wrote {}", path.display());
    Ok(path)
}

/// Prepends a white band of `height` pixels above the image
fn with_header(source: &DynamicImage, height: u32) -> Result<DynamicImage, OutputError> {
    let body = source.to_rgba8();
    let total_height = body
        .height()
        .checked_add(height)
        .ok_or(OutputError::HeaderTooTall {
            header: height,
            body: body.height(),
        })?;
    let mut canvas = RgbaImage::from_pixel(body.width(), total_height, Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut canvas, &body, 0, i64::from(height));
    Ok(DynamicImage::ImageRgba8(canvas))
}

fn image_format(format: OutputFormat) -> ImageFormat {
    match format {
        OutputFormat::Jpg => ImageFormat::Jpeg,
        OutputFormat::Png => ImageFormat::Png,
        OutputFormat::Tiff => ImageFormat::Tiff,
    }
}
