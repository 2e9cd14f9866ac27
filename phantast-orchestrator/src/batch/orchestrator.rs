//! Batch orchestrator
//!
//! State machine: `Idle -> Running -> {Completed, Cancelled}`. Completed and
//! Cancelled are resting states from which a new job may start. At most one
//! job runs at a time per orchestrator.
//!
//! Files are dispatched in enumeration order onto a pool of `workers` tasks.
//! Cancellation is cooperative: it is checked before each file starts, and
//! in-flight files finish normally. Success and failure totals are exact; the
//! report's `failed_files` lists every failed file once, in completion order.

use chrono::Utc;
use phantast_core::domain::batch::{BatchConfig, BatchJob, BatchState, JobReport, ProgressState};
use phantast_core::domain::image::Image;
use phantast_core::domain::pipeline::Pipeline;
use phantast_core::dto::batch::BatchStatus;
use phantast_engine::{ExecutionOrder, ExecutorRegistry, PipelineRunner, StepError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::batch::BatchError;
use crate::config::Config;
use crate::io::{
    InputEnumerationError, InputSource, OutputError, OutputRequest, OutputWriter, output_names,
};

/// Tallest header band accepted in a [`BatchConfig`]
pub const MAX_HEADER_HEIGHT: u32 = 4096;

/// Tuning for a [`BatchOrchestrator`]
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorOptions {
    /// Files processed concurrently
    pub workers: usize,
    /// Sub-folder of the input folder used when a job names no output folder
    pub output_dir_name: String,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for OrchestratorOptions {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.workers,
            output_dir_name: config.output_dir_name.clone(),
        }
    }
}

/// Runs batch jobs and exposes their progress
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct BatchOrchestrator {
    shared: Arc<Shared>,
}

struct Shared {
    runner: PipelineRunner,
    input: Arc<dyn InputSource>,
    output: Arc<dyn OutputWriter>,
    options: OrchestratorOptions,
    /// Serializes `start` across its await points
    starting: tokio::sync::Mutex<()>,
    control: Mutex<Control>,
    progress: watch::Sender<ProgressState>,
}

struct Control {
    state: BatchState,
    config: BatchConfig,
    active: Option<ActiveJob>,
    last_report: Option<JobReport>,
}

struct ActiveJob {
    job: BatchJob,
    cancel: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Why one file did not produce output
#[derive(Debug, Error)]
enum FileFailure {
    #[error(transparent)]
    Step(#[from] StepError),

    #[error("output: {0}")]
    Output(#[from] OutputError),

    #[error("pipeline produced no result")]
    NoResult,

    #[error("worker failed: {0}")]
    Worker(String),
}

/// Per-job counters shared by the file tasks
#[derive(Default)]
struct Tally {
    success: AtomicUsize,
    failure: AtomicUsize,
    completed: AtomicUsize,
    failed_files: Mutex<Vec<String>>,
}

impl Tally {
    /// Records one finished file and returns how many files have finished
    fn record(&self, filename: &str, succeeded: bool) -> usize {
        if succeeded {
            self.success.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failure.fetch_add(1, Ordering::SeqCst);
            self.failed_files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(filename.to_string());
        }
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Everything a running job needs, moved into its driver task
struct JobRun {
    job: BatchJob,
    order: Arc<ExecutionOrder>,
    images: Vec<Image>,
    /// Output name per image, same order as `images`
    output_names: Vec<String>,
    config: Arc<BatchConfig>,
    cancel: Arc<AtomicBool>,
}

impl BatchOrchestrator {
    pub fn new(
        runner: PipelineRunner,
        input: Arc<dyn InputSource>,
        output: Arc<dyn OutputWriter>,
        options: OrchestratorOptions,
    ) -> Self {
        let (progress, _) = watch::channel(ProgressState::default());
        Self {
            shared: Arc::new(Shared {
                runner,
                input,
                output,
                options: OrchestratorOptions {
                    workers: options.workers.max(1),
                    ..options
                },
                starting: tokio::sync::Mutex::new(()),
                control: Mutex::new(Control {
                    state: BatchState::Idle,
                    config: BatchConfig::default(),
                    active: None,
                    last_report: None,
                }),
                progress,
            }),
        }
    }

    pub fn runner(&self) -> &PipelineRunner {
        &self.shared.runner
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        self.shared.runner.registry()
    }

    /// Starts running `pipeline` over every image in `input_folder`
    ///
    /// Without `output_folder`, output goes to a sub-folder of the input
    /// folder. Nothing changes unless every pre-flight check passes.
    ///
    /// # Errors
    /// - `AlreadyRunning` while another job runs
    /// - `Validation` if the pipeline cannot be built
    /// - `InputEnumeration` if the folder yields no images
    pub async fn start(
        &self,
        pipeline: &Pipeline,
        input_folder: impl Into<PathBuf>,
        output_folder: Option<PathBuf>,
    ) -> Result<BatchJob, BatchError> {
        let _starting = self.shared.starting.lock().await;

        if self.state() == BatchState::Running {
            return Err(BatchError::AlreadyRunning);
        }

        let order = self.shared.runner.build(pipeline)?;

        let input_folder = input_folder.into();
        let images = self.shared.input.enumerate(&input_folder).await?;
        if images.is_empty() {
            return Err(InputEnumerationError::Empty(input_folder).into());
        }

        let output_folder = output_folder
            .unwrap_or_else(|| input_folder.join(&self.shared.options.output_dir_name));
        let job = BatchJob {
            id: Uuid::new_v4(),
            pipeline_id: pipeline.id,
            input_folder,
            output_folder,
            total_files: images.len(),
        };
        let cancel = Arc::new(AtomicBool::new(false));

        let mut control = self.shared.control();
        let run = JobRun {
            job: job.clone(),
            order: Arc::new(order),
            output_names: output_names(&images),
            images,
            config: Arc::new(control.config.clone()),
            cancel: Arc::clone(&cancel),
        };

        control.state = BatchState::Running;
        control.last_report = None;
        self.shared.progress.send_replace(ProgressState {
            is_processing: true,
            current_file_index: 0,
            total_files: job.total_files,
            current_filename: String::new(),
            percent_complete: 0.0,
            status_message: format!("Starting batch of {} file(s)", job.total_files),
        });

        info!(
            "Starting batch job {} for pipeline {} ({} files, {} workers)",
            job.id, job.pipeline_id, job.total_files, self.shared.options.workers
        );

        let task = tokio::spawn(drive(Arc::clone(&self.shared), run));
        control.active = Some(ActiveJob {
            job: job.clone(),
            cancel,
            task: Some(task),
        });

        Ok(job)
    }

    /// Requests cancellation of the running job
    ///
    /// Files already in flight finish normally; no new file starts.
    pub fn cancel(&self) -> Result<(), BatchError> {
        let control = self.shared.control();
        match &control.active {
            Some(active) if control.state == BatchState::Running => {
                if !active.cancel.swap(true, Ordering::SeqCst) {
                    info!("Cancelling batch job {}", active.job.id);
                    self.shared.progress.send_modify(|progress| {
                        progress.status_message = "Cancelling...".to_string();
                    });
                }
                Ok(())
            }
            _ => Err(BatchError::NotRunning),
        }
    }

    /// Waits for the running job (if any) and returns the latest report
    pub async fn wait(&self) -> Option<JobReport> {
        let task = self
            .shared
            .control()
            .active
            .as_mut()
            .and_then(|active| active.task.take());

        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Batch driver task failed: {}", e);
            }
        }

        self.report()
    }

    pub fn state(&self) -> BatchState {
        self.shared.control().state
    }

    /// Current progress snapshot
    pub fn progress(&self) -> ProgressState {
        self.shared.progress.borrow().clone()
    }

    /// Receives every progress update from now on
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.shared.progress.subscribe()
    }

    pub fn status(&self) -> BatchStatus {
        let control = self.shared.control();
        BatchStatus {
            state: control.state,
            active_job: control.active.as_ref().map(|active| active.job.clone()),
            progress: self.progress(),
        }
    }

    /// Report of the last finished job, until the next job starts
    pub fn report(&self) -> Option<JobReport> {
        self.shared.control().last_report.clone()
    }

    pub fn config(&self) -> BatchConfig {
        self.shared.control().config.clone()
    }

    /// Replaces the rendering options used by the next job
    pub fn update_config(&self, config: BatchConfig) -> Result<(), BatchError> {
        if config.header_height > MAX_HEADER_HEIGHT {
            return Err(BatchError::InvalidConfig(format!(
                "header_height must be at most {}",
                MAX_HEADER_HEIGHT
            )));
        }

        let mut control = self.shared.control();
        if control.state == BatchState::Running {
            return Err(BatchError::AlreadyRunning);
        }
        debug!("Batch config updated: {:?}", config);
        control.config = config;
        Ok(())
    }
}

/// Dispatches every file of a job, then publishes its report
async fn drive(shared: Arc<Shared>, run: JobRun) {
    let JobRun {
        job,
        order,
        images,
        output_names,
        config,
        cancel,
    } = run;

    let total = images.len();
    let semaphore = Arc::new(Semaphore::new(shared.options.workers));
    let tally = Arc::new(Tally::default());
    let mut tasks = JoinSet::new();

    for (idx, (image, output_name)) in images.into_iter().zip(output_names).enumerate() {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };

        if cancel.load(Ordering::SeqCst) {
            info!("Batch job {} stopping before file {}", job.id, idx + 1);
            break;
        }

        let index = idx + 1;
        shared.progress.send_modify(|progress| {
            progress.current_file_index = index;
            progress.current_filename = image.filename.clone();
            progress.status_message = format!("Processing {} ({}/{})", image.filename, index, total);
        });

        let shared = Arc::clone(&shared);
        let tally = Arc::clone(&tally);
        let order = Arc::clone(&order);
        let config = Arc::clone(&config);
        let output_folder = job.output_folder.clone();

        tasks.spawn(async move {
            let outcome =
                process_file(&shared, &image, &output_name, order, &config, &output_folder).await;
            let failure = outcome.as_ref().err().map(ToString::to_string);
            if let Some(reason) = &failure {
                warn!("File {} failed: {}", image.filename, reason);
            }

            let done = tally.record(&image.filename, failure.is_none());
            shared.progress.send_modify(|progress| {
                progress.percent_complete = done as f64 / total as f64 * 100.0;
                if let Some(reason) = &failure {
                    progress.status_message = format!("{} failed: {}", image.filename, reason);
                }
            });
            drop(permit);
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("File task for job {} panicked: {}", job.id, e);
        }
    }

    let outcome = if cancel.load(Ordering::SeqCst) {
        BatchState::Cancelled
    } else {
        BatchState::Completed
    };

    let report = JobReport {
        job_id: job.id,
        completed_at: Utc::now(),
        outcome,
        success_count: tally.success.load(Ordering::SeqCst),
        failure_count: tally.failure.load(Ordering::SeqCst),
        failed_files: std::mem::take(
            &mut *tally
                .failed_files
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        ),
    };

    info!(
        "Batch job {} {}: {} succeeded, {} failed",
        job.id,
        outcome.to_string().to_lowercase(),
        report.success_count,
        report.failure_count
    );

    // The final progress write happens under the control lock: once the state
    // leaves Running a new job may start and publish its own progress.
    let mut control = shared.control();
    shared.progress.send_modify(|progress| {
        progress.is_processing = false;
        if outcome == BatchState::Completed {
            progress.percent_complete = 100.0;
        }
        progress.status_message = format!(
            "{}: {} succeeded, {} failed",
            outcome, report.success_count, report.failure_count
        );
    });
    control.state = outcome;
    control.active = None;
    control.last_report = Some(report);
}

/// Runs the pipeline for one image and writes its output
async fn process_file(
    shared: &Shared,
    image: &Image,
    output_name: &str,
    order: Arc<ExecutionOrder>,
    config: &BatchConfig,
    output_folder: &Path,
) -> Result<PathBuf, FileFailure> {
    let runner = shared.runner.clone();
    let task_image = image.clone();
    let task_order = Arc::clone(&order);
    let run = tokio::task::spawn_blocking(move || runner.run_to_completion(&task_image, &task_order))
        .await
        .map_err(|e| FileFailure::Worker(e.to_string()))?;

    if let Some(err) = &run.failure {
        return Err(err.clone().into());
    }
    let result = run.final_result().ok_or(FileFailure::NoResult)?;
    debug!(
        "Pipeline finished for {} ({} cached, {} executed)",
        image.filename, run.cache_hits, run.executed
    );

    let path = shared
        .output
        .write(OutputRequest {
            image,
            output_name,
            result,
            steps: order.steps(),
            config,
            output_folder,
        })
        .await?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use phantast_core::domain::batch::OutputFormat;
    use phantast_core::domain::image::Dimensions;
    use phantast_core::domain::pipeline::{Params, PipelineStep};
    use phantast_core::domain::result::StepOutput;
    use phantast_engine::{OperationError, ResultCache, StepInput};
    use std::sync::OnceLock;

    struct StaticInput(Vec<Image>);

    #[async_trait]
    impl InputSource for StaticInput {
        async fn enumerate(&self, _folder: &Path) -> Result<Vec<Image>, InputEnumerationError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        written: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingWriter {
        fn written(&self) -> Vec<String> {
            self.written.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OutputWriter for RecordingWriter {
        async fn write(&self, request: OutputRequest<'_>) -> Result<PathBuf, OutputError> {
            if self.fail_on == Some(request.image.filename.as_str()) {
                return Err(OutputError::Worker("disk full".to_string()));
            }
            self.written
                .lock()
                .unwrap()
                .push(request.image.filename.clone());
            Ok(request.output_folder.join(&request.image.filename))
        }
    }

    fn images(count: usize) -> Vec<Image> {
        (1..=count)
            .map(|i| {
                Image::new(
                    format!("/input/file_{:02}.png", i),
                    Dimensions { width: 1, height: 1 },
                )
            })
            .collect()
    }

    fn orchestrator(
        registry: ExecutorRegistry,
        images: Vec<Image>,
        writer: Arc<RecordingWriter>,
        workers: usize,
    ) -> BatchOrchestrator {
        BatchOrchestrator::new(
            PipelineRunner::new(Arc::new(registry), ResultCache::default()),
            Arc::new(StaticInput(images)),
            writer,
            OrchestratorOptions {
                workers,
                output_dir_name: "processed".to_string(),
            },
        )
    }

    fn pipeline(operation_id: &str) -> Pipeline {
        Pipeline::with_steps(
            "batch",
            vec![PipelineStep::new(1, operation_id, operation_id)],
        )
    }

    /// Registers "count", which fails for one file name when asked to
    fn counting_registry(calls: &Arc<AtomicUsize>, fail_on: Option<&'static str>) -> ExecutorRegistry {
        let calls = Arc::clone(calls);
        let mut registry = ExecutorRegistry::new();
        registry
            .register("count", move |input: StepInput<'_>, _params: &Params| {
                calls.fetch_add(1, Ordering::SeqCst);
                if fail_on == Some(input.image.filename.as_str()) {
                    return Err(OperationError::new("segmentation failed"));
                }
                Ok(StepOutput::artifact(input.artifact()))
            })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_batch_completes_with_report() {
        let calls = Arc::new(AtomicUsize::new(0));
        let writer = Arc::new(RecordingWriter::default());
        let orch = orchestrator(counting_registry(&calls, None), images(4), Arc::clone(&writer), 2);

        let job = orch.start(&pipeline("count"), "/input", None).await.unwrap();
        assert_eq!(job.total_files, 4);
        assert_eq!(job.output_folder, PathBuf::from("/input/processed"));

        let report = orch.wait().await.unwrap();
        assert_eq!(report.job_id, job.id);
        assert_eq!(report.outcome, BatchState::Completed);
        assert_eq!(report.success_count, 4);
        assert_eq!(report.failure_count, 0);
        assert!(report.failed_files.is_empty());

        let progress = orch.progress();
        assert!(!progress.is_processing);
        assert_eq!(progress.current_file_index, 4);
        assert_eq!(progress.percent_complete, 100.0);
        assert_eq!(orch.state(), BatchState::Completed);
        assert!(orch.status().active_job.is_none());

        let mut written = writer.written();
        written.sort();
        assert_eq!(written, vec!["file_01.png", "file_02.png", "file_03.png", "file_04.png"]);
    }

    #[tokio::test]
    async fn test_file_failure_does_not_abort_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let writer = Arc::new(RecordingWriter::default());
        let orch = orchestrator(
            counting_registry(&calls, Some("file_03.png")),
            images(5),
            Arc::clone(&writer),
            2,
        );

        orch.start(&pipeline("count"), "/input", None).await.unwrap();
        let report = orch.wait().await.unwrap();

        assert_eq!(report.outcome, BatchState::Completed);
        assert_eq!(report.failure_count, 1);
        assert_eq!(report.success_count, 4);
        assert_eq!(report.failed_files, vec!["file_03.png"]);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(writer.written().len(), 4);
    }

    #[tokio::test]
    async fn test_output_failure_counts_as_file_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let writer = Arc::new(RecordingWriter {
            fail_on: Some("file_02.png"),
            ..Default::default()
        });
        let orch = orchestrator(counting_registry(&calls, None), images(3), writer, 1);

        orch.start(&pipeline("count"), "/input", None).await.unwrap();
        let report = orch.wait().await.unwrap();

        assert_eq!(report.success_count, 2);
        assert_eq!(report.failed_files, vec!["file_02.png"]);
    }

    #[tokio::test]
    async fn test_cancel_after_second_file() {
        let handle: Arc<OnceLock<BatchOrchestrator>> = Arc::new(OnceLock::new());
        let hook = Arc::clone(&handle);
        let mut registry = ExecutorRegistry::new();
        registry
            .register("cancel_on_second", move |input: StepInput<'_>, _params: &Params| {
                if input.image.filename == "file_02.png" {
                    if let Some(orch) = hook.get() {
                        orch.cancel().unwrap();
                    }
                }
                Ok::<_, OperationError>(StepOutput::artifact(input.artifact()))
            })
            .unwrap();

        let orch = orchestrator(registry, images(10), Arc::new(RecordingWriter::default()), 1);
        let _ = handle.set(orch.clone());

        orch.start(&pipeline("cancel_on_second"), "/input", None)
            .await
            .unwrap();
        let report = orch.wait().await.unwrap();

        assert_eq!(report.outcome, BatchState::Cancelled);
        assert_eq!(report.success_count + report.failure_count, 2);
        assert!(report.success_count + report.failure_count <= 10);

        let progress = orch.progress();
        assert!(!progress.is_processing);
        assert_eq!(progress.current_file_index, 2);
        assert_eq!(progress.total_files, 10);
        assert_eq!(progress.percent_complete, 20.0);
        assert_eq!(orch.state(), BatchState::Cancelled);
    }

    /// Registers "gate", which reports each file it enters and then blocks
    /// until released once
    fn register_gate(
        registry: &mut ExecutorRegistry,
        calls: &Arc<AtomicUsize>,
    ) -> (
        tokio::sync::mpsc::UnboundedReceiver<String>,
        std::sync::mpsc::Sender<()>,
    ) {
        let (entered_tx, entered_rx) = tokio::sync::mpsc::unbounded_channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let calls = Arc::clone(calls);

        registry
            .register("gate", move |input: StepInput<'_>, _params: &Params| {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = entered_tx.send(input.image.filename.clone());
                let _ = release_rx.lock().unwrap().recv();
                Ok::<_, OperationError>(StepOutput::artifact(input.artifact()))
            })
            .unwrap();
        (entered_rx, release_tx)
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_files_finish() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ExecutorRegistry::new();
        let (mut entered, release) = register_gate(&mut registry, &calls);
        let writer = Arc::new(RecordingWriter::default());
        let orch = orchestrator(registry, images(10), Arc::clone(&writer), 3);

        orch.start(&pipeline("gate"), "/input", None).await.unwrap();
        let mut in_flight = Vec::new();
        for _ in 0..3 {
            in_flight.push(entered.recv().await.unwrap());
        }
        in_flight.sort();
        assert_eq!(in_flight, vec!["file_01.png", "file_02.png", "file_03.png"]);
        assert_eq!(orch.progress().current_file_index, 3);

        orch.cancel().unwrap();
        for _ in 0..3 {
            release.send(()).unwrap();
        }
        let report = orch.wait().await.unwrap();

        assert_eq!(report.outcome, BatchState::Cancelled);
        assert_eq!(report.success_count, 3);
        assert_eq!(report.failure_count, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let mut written = writer.written();
        written.sort();
        assert_eq!(written, in_flight);

        let progress = orch.progress();
        assert_eq!(progress.current_file_index, 3);
        assert!((progress.percent_complete - 30.0).abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_next_job_progress_survives_previous_finish() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = counting_registry(&calls, None);
        let (mut entered, release) = register_gate(&mut registry, &calls);
        let orch = orchestrator(registry, images(1), Arc::new(RecordingWriter::default()), 1);

        orch.start(&pipeline("count"), "/input", None).await.unwrap();
        // Start again as soon as the state leaves Running, without joining
        // the previous driver
        while orch.state() == BatchState::Running {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        let first = orch.progress();
        assert!(!first.is_processing);
        assert_eq!(first.percent_complete, 100.0);

        let second = orch.start(&pipeline("gate"), "/input", None).await.unwrap();
        entered.recv().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let progress = orch.progress();
        assert!(progress.is_processing);
        assert_eq!(progress.percent_complete, 0.0);
        assert!(progress.status_message.starts_with("Processing"));
        assert_eq!(orch.state(), BatchState::Running);

        release.send(()).unwrap();
        let report = orch.wait().await.unwrap();
        assert_eq!(report.job_id, second.id);
        assert_eq!(report.outcome, BatchState::Completed);
    }

    #[tokio::test]
    async fn test_start_while_running_is_rejected() {
        let (entered_tx, mut entered_rx) = tokio::sync::mpsc::unbounded_channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let mut registry = ExecutorRegistry::new();
        registry
            .register("gate", move |input: StepInput<'_>, _params: &Params| {
                let _ = entered_tx.send(());
                let _ = release_rx.lock().unwrap().recv();
                Ok::<_, OperationError>(StepOutput::artifact(input.artifact()))
            })
            .unwrap();

        let orch = orchestrator(registry, images(1), Arc::new(RecordingWriter::default()), 1);
        let first = orch.start(&pipeline("gate"), "/input", None).await.unwrap();
        entered_rx.recv().await.unwrap();

        let before = orch.progress();
        assert_eq!(orch.state(), BatchState::Running);
        assert_eq!(orch.status().active_job.unwrap().id, first.id);

        let err = orch
            .start(&pipeline("gate"), "/input", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::AlreadyRunning));
        assert_eq!(orch.progress(), before);
        assert!(matches!(
            orch.update_config(BatchConfig::default()),
            Err(BatchError::AlreadyRunning)
        ));

        release_tx.send(()).unwrap();
        let report = orch.wait().await.unwrap();
        assert_eq!(report.job_id, first.id);
        assert_eq!(report.outcome, BatchState::Completed);
    }

    #[tokio::test]
    async fn test_rerun_reuses_cached_results() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(
            counting_registry(&calls, None),
            images(3),
            Arc::new(RecordingWriter::default()),
            2,
        );
        let pipeline = pipeline("count");

        orch.start(&pipeline, "/input", None).await.unwrap();
        orch.wait().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Completed is a resting state
        orch.start(&pipeline, "/input", None).await.unwrap();
        let report = orch.wait().await.unwrap();
        assert_eq!(report.success_count, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_pipeline_never_starts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(
            counting_registry(&calls, None),
            images(2),
            Arc::new(RecordingWriter::default()),
            1,
        );

        let err = orch
            .start(&pipeline("unregistered"), "/input", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Validation(_)));
        assert_eq!(orch.state(), BatchState::Idle);
        assert_eq!(orch.progress(), ProgressState::default());
        assert!(orch.report().is_none());
    }

    #[tokio::test]
    async fn test_empty_input_is_an_enumeration_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(
            counting_registry(&calls, None),
            Vec::new(),
            Arc::new(RecordingWriter::default()),
            1,
        );

        let err = orch
            .start(&pipeline("count"), "/input", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InputEnumeration(_)));
        assert_eq!(orch.state(), BatchState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_and_config_while_idle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(
            counting_registry(&calls, None),
            images(1),
            Arc::new(RecordingWriter::default()),
            1,
        );

        assert!(matches!(orch.cancel(), Err(BatchError::NotRunning)));

        let config = BatchConfig {
            add_header: true,
            output_format: OutputFormat::Tiff,
            ..BatchConfig::default()
        };
        orch.update_config(config.clone()).unwrap();
        assert_eq!(orch.config(), config);

        let too_tall = BatchConfig {
            header_height: u32::MAX,
            ..config.clone()
        };
        assert!(matches!(
            orch.update_config(too_tall),
            Err(BatchError::InvalidConfig(_))
        ));
        assert_eq!(orch.config(), config);
    }

    #[tokio::test]
    async fn test_explicit_output_folder_and_subscription() {
        let calls = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(
            counting_registry(&calls, None),
            images(2),
            Arc::new(RecordingWriter::default()),
            1,
        );
        let mut updates = orch.subscribe();

        let job = orch
            .start(&pipeline("count"), "/input", Some(PathBuf::from("/out")))
            .await
            .unwrap();
        assert_eq!(job.output_folder, PathBuf::from("/out"));

        updates
            .wait_for(|progress| !progress.is_processing && progress.percent_complete == 100.0)
            .await
            .unwrap();
        assert_eq!(orch.wait().await.unwrap().success_count, 2);
    }
}
