//! Pipeline runner
//!
//! Executes an [`ExecutionOrder`] against one image. Each step is fingerprinted
//! from its operation, parameters and upstream state; a cache hit reuses the
//! stored result, a miss invokes the registered executor and stores the new
//! result. The first failing step halts the remaining steps for that image.
//!
//! Runs are lazy: [`PipelineRunner::run`] returns an iterator, and calling it
//! again simply re-consults the cache.

use phantast_core::domain::image::Image;
use phantast_core::domain::pipeline::{Pipeline, PipelineStep};
use phantast_core::domain::result::StepResult;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{PinnedResult, ResultCache, for_step};
use crate::error::{StepError, ValidationError};
use crate::fingerprint::{Fingerprint, compute_fingerprint};
use crate::graph::ExecutionOrder;
use crate::registry::{ExecutorRegistry, StepInput};

/// Runs pipelines against images, sharing one registry and one cache
#[derive(Clone)]
pub struct PipelineRunner {
    registry: Arc<ExecutorRegistry>,
    cache: ResultCache,
}

/// One step's outcome, emitted in execution order
#[derive(Debug, Clone)]
pub struct StepEvent {
    pub step_id: Uuid,
    pub position: usize,
    /// True when the result came from the cache without running the executor
    pub cached: bool,
    pub outcome: Result<Arc<StepResult>, StepError>,
}

/// Collected outcome of a full run over one image
#[derive(Debug, Clone)]
pub struct ImageRun {
    pub image_id: Uuid,
    /// Results of the steps that succeeded, in execution order
    pub results: Vec<Arc<StepResult>>,
    /// The error that halted the run, if any
    pub failure: Option<StepError>,
    pub cache_hits: usize,
    pub executed: usize,
}

impl ImageRun {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Result of the last step, when every step succeeded
    pub fn final_result(&self) -> Option<&Arc<StepResult>> {
        match self.failure {
            None => self.results.last(),
            Some(_) => None,
        }
    }
}

/// Two already-computed results, side by side
#[derive(Debug, Clone)]
pub struct Comparison {
    pub a: Arc<StepResult>,
    pub b: Arc<StepResult>,
    /// `b - a` when both carry a confluency value
    pub confluency_delta: Option<f64>,
}

impl PipelineRunner {
    pub fn new(registry: Arc<ExecutorRegistry>, cache: ResultCache) -> Self {
        Self { registry, cache }
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Validates and linearizes a pipeline against this runner's registry
    pub fn build(&self, pipeline: &Pipeline) -> Result<ExecutionOrder, ValidationError> {
        ExecutionOrder::build(pipeline, &self.registry)
    }

    /// Lazily executes `order` against `image`
    pub fn run<'a>(&'a self, image: &'a Image, order: &'a ExecutionOrder) -> StepRun<'a> {
        StepRun {
            runner: self,
            image,
            order,
            position: 0,
            upstream_state: Fingerprint::source(image),
            upstream: None,
            halted: false,
        }
    }

    /// Drives a run to its end and collects the outcome
    pub fn run_to_completion(&self, image: &Image, order: &ExecutionOrder) -> ImageRun {
        let mut run = ImageRun {
            image_id: image.id,
            results: Vec::with_capacity(order.len()),
            failure: None,
            cache_hits: 0,
            executed: 0,
        };

        for event in self.run(image, order) {
            match event.outcome {
                Ok(result) => {
                    if event.cached {
                        run.cache_hits += 1;
                    } else {
                        run.executed += 1;
                    }
                    run.results.push(result);
                }
                Err(err) => run.failure = Some(err),
            }
        }

        run
    }

    /// Reads two already-computed results for side-by-side comparison
    ///
    /// Never runs anything; returns `None` unless both steps have a current
    /// result for the image.
    pub fn compare(&self, image_id: Uuid, step_a: Uuid, step_b: Uuid) -> Option<Comparison> {
        let a = self.cache.latest(image_id, step_a)?;
        let b = self.cache.latest(image_id, step_b)?;
        let confluency_delta = match (a.confluency, b.confluency) {
            (Some(x), Some(y)) => Some(y - x),
            _ => None,
        };
        Some(Comparison {
            a,
            b,
            confluency_delta,
        })
    }
}

/// Iterator over the step outcomes of one run
///
/// Holds a pin on the upstream result while the next step executes, so the
/// cache cannot evict what the executor is reading.
pub struct StepRun<'a> {
    runner: &'a PipelineRunner,
    image: &'a Image,
    order: &'a ExecutionOrder,
    position: usize,
    upstream_state: Fingerprint,
    upstream: Option<PinnedResult>,
    halted: bool,
}

impl StepRun<'_> {
    fn halt(&mut self, step: &PipelineStep, error: StepError) -> StepEvent {
        warn!(
            "Step '{}' failed for image {}: {}",
            step.name, self.image.filename, error
        );
        self.halted = true;
        self.upstream = None;
        self.runner
            .cache
            .truncate_chain(self.image.id, self.position);
        StepEvent {
            step_id: step.id,
            position: self.position,
            cached: false,
            outcome: Err(error),
        }
    }

    fn resolve(&mut self, step: &PipelineStep, fingerprint: Fingerprint) -> Result<(PinnedResult, bool), StepError> {
        let cache = &self.runner.cache;

        if let Some(hit) = cache.get(self.image.id, fingerprint) {
            debug!(
                "Cache hit for step '{}' on image {}",
                step.name, self.image.filename
            );
            return Ok((hit, true));
        }

        let executor = self
            .runner
            .registry
            .get(&step.operation_id)
            .ok_or_else(|| StepError::MissingExecutor {
                step_id: step.id,
                operation_id: step.operation_id.clone(),
            })?;

        debug!(
            "Cache miss for step '{}' on image {}, running '{}'",
            step.name, self.image.filename, step.operation_id
        );

        let input = StepInput {
            image: self.image,
            upstream: self.upstream.as_deref(),
        };
        let output = executor
            .execute(input, &step.params)
            .map_err(|source| StepError::Operation {
                step_id: step.id,
                operation_id: step.operation_id.clone(),
                source,
            })?;

        let result = StepResult::from_output(step.id, output);
        Ok((cache.put(self.image.id, fingerprint, result), false))
    }
}

impl Iterator for StepRun<'_> {
    type Item = StepEvent;

    fn next(&mut self) -> Option<StepEvent> {
        if self.halted {
            return None;
        }

        let order = self.order;
        let Some(step) = order.steps().get(self.position) else {
            // Drop links left over from a longer earlier run
            self.runner.cache.truncate_chain(self.image.id, self.position);
            self.upstream = None;
            self.halted = true;
            return None;
        };

        let fingerprint = match compute_fingerprint(&step.params, &self.upstream_state, &step.operation_id) {
            Ok(fingerprint) => fingerprint,
            Err(source) => {
                let error = StepError::InvalidParameter {
                    step_id: step.id,
                    source,
                };
                return Some(self.halt(step, error));
            }
        };

        let (pinned, cached) = match self.resolve(step, fingerprint) {
            Ok(resolved) => resolved,
            Err(error) => return Some(self.halt(step, error)),
        };

        self.runner
            .cache
            .record_step(self.image.id, self.position, step.id, fingerprint);
        self.upstream_state = fingerprint.chain(&pinned);
        let result = for_step(pinned.result(), step.id);
        // Replacing the previous upstream releases its pin
        self.upstream = Some(pinned);

        let event = StepEvent {
            step_id: step.id,
            position: self.position,
            cached,
            outcome: Ok(result),
        };
        self.position += 1;
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheLimits;
    use crate::error::OperationError;
    use crate::registry::StepExecutor;
    use phantast_core::domain::image::Dimensions;
    use phantast_core::domain::pipeline::{Params, PipelineStep};
    use phantast_core::domain::result::StepOutput;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Appends its operation name to the upstream artifact and counts calls
    struct Tagger {
        tag: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl StepExecutor for Tagger {
        fn execute(
            &self,
            input: StepInput<'_>,
            params: &Params,
        ) -> Result<StepOutput, OperationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if params.get("fail").and_then(|v| v.as_bool()) == Some(true) {
                return Err(OperationError::new(format!("{} refused", self.tag)));
            }
            let suffix = params
                .get("suffix")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(StepOutput::artifact(format!(
                "{}>{}{}",
                input.artifact(),
                self.tag,
                suffix
            )))
        }
    }

    struct Fixture {
        runner: PipelineRunner,
        calls: Arc<AtomicUsize>,
        image: Image,
    }

    fn fixture() -> Fixture {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ExecutorRegistry::new();
        for tag in ["a", "b", "c"] {
            registry
                .register(
                    tag,
                    Tagger {
                        tag,
                        calls: Arc::clone(&calls),
                    },
                )
                .unwrap();
        }
        Fixture {
            runner: PipelineRunner::new(Arc::new(registry), ResultCache::new(CacheLimits::default())),
            calls,
            image: Image::new("/img.png", Dimensions { width: 2, height: 2 }),
        }
    }

    fn three_steps() -> Pipeline {
        Pipeline::with_steps(
            "p",
            vec![
                PipelineStep::new(1, "a", "A"),
                PipelineStep::new(2, "b", "B"),
                PipelineStep::new(3, "c", "C"),
            ],
        )
    }

    fn urls(run: &ImageRun) -> Vec<String> {
        run.results.iter().map(|r| r.image_url.clone()).collect()
    }

    #[test]
    fn test_first_run_executes_every_step() {
        let f = fixture();
        let order = f.runner.build(&three_steps()).unwrap();
        let run = f.runner.run_to_completion(&f.image, &order);

        assert!(run.is_success());
        assert_eq!(urls(&run), vec!["/img.png>a", "/img.png>a>b", "/img.png>a>b>c"]);
        assert_eq!(run.executed, 3);
        assert_eq!(f.calls.load(Ordering::SeqCst), 3);
        assert_eq!(run.final_result().unwrap().image_url, "/img.png>a>b>c");
    }

    #[test]
    fn test_warm_cache_rerun_invokes_nothing() {
        let f = fixture();
        let order = f.runner.build(&three_steps()).unwrap();
        let first = f.runner.run_to_completion(&f.image, &order);
        let second = f.runner.run_to_completion(&f.image, &order);

        assert_eq!(f.calls.load(Ordering::SeqCst), 3);
        assert_eq!(second.cache_hits, 3);
        assert_eq!(second.executed, 0);
        let ids = |run: &ImageRun| run.results.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_param_change_recomputes_from_that_step() {
        let f = fixture();
        let mut pipeline = three_steps();
        let order = f.runner.build(&pipeline).unwrap();
        let first = f.runner.run_to_completion(&f.image, &order);

        let b = pipeline.ordered_steps()[1].id;
        let mut params = Params::new();
        params.insert("suffix".to_string(), json!("!"));
        pipeline.update_params(b, params);

        let order = f.runner.build(&pipeline).unwrap();
        let second = f.runner.run_to_completion(&f.image, &order);

        assert_eq!(second.cache_hits, 1);
        assert_eq!(second.executed, 2);
        assert_eq!(first.results[0].id, second.results[0].id);
        assert_ne!(first.results[1].id, second.results[1].id);
        assert_eq!(second.results[2].image_url, "/img.png>a>b!>c");
    }

    #[test]
    fn test_disabled_step_matches_pipeline_without_it() {
        let f = fixture();
        let mut with_disabled = three_steps();
        let b = with_disabled.ordered_steps()[1].id;
        with_disabled.toggle_step(b, false);

        let without = Pipeline::with_steps(
            "p2",
            vec![PipelineStep::new(1, "a", "A"), PipelineStep::new(3, "c", "C")],
        );

        let run_a = f
            .runner
            .run_to_completion(&f.image, &f.runner.build(&with_disabled).unwrap());
        let run_b = f
            .runner
            .run_to_completion(&f.image, &f.runner.build(&without).unwrap());

        assert_eq!(urls(&run_a), vec!["/img.png>a", "/img.png>a>c"]);
        assert_eq!(urls(&run_a), urls(&run_b));
        // Same fingerprints, so the second pipeline is served from cache
        assert_eq!(run_b.cache_hits, 2);
    }

    #[test]
    fn test_failure_halts_remaining_steps() {
        let f = fixture();
        let mut pipeline = three_steps();
        let b = pipeline.ordered_steps()[1].id;
        let mut params = Params::new();
        params.insert("fail".to_string(), json!(true));
        pipeline.update_params(b, params);

        let order = f.runner.build(&pipeline).unwrap();
        let events: Vec<StepEvent> = f.runner.run(&f.image, &order).collect();

        assert_eq!(events.len(), 2);
        assert!(events[0].outcome.is_ok());
        match &events[1].outcome {
            Err(StepError::Operation { step_id, .. }) => assert_eq!(*step_id, b),
            other => panic!("expected operation error, got {:?}", other),
        }
        // Step c never ran
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalid_params_halt_run() {
        let f = fixture();
        let mut pipeline = three_steps();
        let a = pipeline.ordered_steps()[0].id;
        let mut params = Params::new();
        params.insert(String::new(), json!(1));
        pipeline.update_params(a, params);

        let order = f.runner.build(&pipeline).unwrap();
        let run = f.runner.run_to_completion(&f.image, &order);
        assert!(matches!(run.failure, Some(StepError::InvalidParameter { .. })));
        assert!(run.results.is_empty());
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_run_is_lazy() {
        let f = fixture();
        let order = f.runner.build(&three_steps()).unwrap();
        let mut run = f.runner.run(&f.image, &order);
        let first = run.next().unwrap();
        assert_eq!(first.position, 0);
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
        drop(run);
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_latest_results_and_compare() {
        let f = fixture();
        let pipeline = three_steps();
        let order = f.runner.build(&pipeline).unwrap();
        f.runner.run_to_completion(&f.image, &order);

        let ids = order.step_ids();
        let chain = f.runner.cache().results_for(f.image.id);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[2].step_id, ids[2]);

        let comparison = f.runner.compare(f.image.id, ids[0], ids[2]).unwrap();
        assert_eq!(comparison.a.image_url, "/img.png>a");
        assert_eq!(comparison.b.image_url, "/img.png>a>b>c");
        assert!(comparison.confluency_delta.is_none());
        assert!(f.runner.compare(f.image.id, ids[0], Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_failure_truncates_latest_chain() {
        let f = fixture();
        let mut pipeline = three_steps();
        let order = f.runner.build(&pipeline).unwrap();
        f.runner.run_to_completion(&f.image, &order);

        let b = pipeline.ordered_steps()[1].id;
        let mut params = Params::new();
        params.insert("fail".to_string(), json!(true));
        pipeline.update_params(b, params);
        let order = f.runner.build(&pipeline).unwrap();
        f.runner.run_to_completion(&f.image, &order);

        assert_eq!(f.runner.cache().results_for(f.image.id).len(), 1);
        assert!(f.runner.cache().latest(f.image.id, b).is_none());
    }

    #[test]
    fn test_invalidate_downstream_forces_recompute() {
        let f = fixture();
        let order = f.runner.build(&three_steps()).unwrap();
        f.runner.run_to_completion(&f.image, &order);

        let ids = order.step_ids();
        assert_eq!(f.runner.cache().invalidate_downstream(f.image.id, ids[1]), 2);

        let run = f.runner.run_to_completion(&f.image, &order);
        assert_eq!(run.cache_hits, 1);
        assert_eq!(run.executed, 2);
    }

    #[test]
    fn test_images_do_not_share_results() {
        let f = fixture();
        let order = f.runner.build(&three_steps()).unwrap();
        let other = Image::new("/other.png", Dimensions { width: 2, height: 2 });

        f.runner.run_to_completion(&f.image, &order);
        let run = f.runner.run_to_completion(&other, &order);
        assert_eq!(run.executed, 3);
        assert_eq!(run.results[2].image_url, "/other.png>a>b>c");
    }
}
