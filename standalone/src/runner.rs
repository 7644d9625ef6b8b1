//! Drives a workload over a set of traces: a parallel map phase followed by
//! an optional two-stage reduce phase.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use common::{JobResults, MapFn, MapResults, ReduceFn, TraceHandle, TraceResults, Workload};

use crate::error::JobError;
use crate::map::map_single_trace;
use crate::output::{JobOutput, OutputFormatter};
use crate::progress::{ConsoleProgressReporter, ProgressReporter};
use crate::reduce::reduce_map_results;
use crate::store::{self, StoreKind, TransientStore};
use crate::work_queue::WorkQueue;

/// Number of workers used for parallel tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobCount {
    /// One worker per logical CPU.
    #[default]
    Auto,
    Fixed(usize),
}

impl JobCount {
    pub fn resolve(self) -> usize {
        match self {
            JobCount::Auto => num_cpus::get(),
            JobCount::Fixed(n) => n.max(1),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Abort the map phase as soon as a merged trace carries failures. Also
    /// makes reduce failures fatal.
    pub stop_on_error: bool,

    pub jobs: JobCount,

    /// Backing for the hand-off between map output and reduce tasks.
    pub store: StoreKind,

    /// Directory for disk-backed staging files. Defaults to the system temp
    /// directory.
    pub staging_dir: Option<PathBuf>,
}

/// Terminal state of a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Aborted(JobError),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

/// What the map phase produced. An aborted phase still carries everything
/// merged up to the abort.
#[derive(Debug, Clone)]
pub struct MapperOutput {
    pub results: MapResults,
    pub outcome: RunOutcome,
}

/// What [`MapRunner::run`] returns.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub results: Option<JobOutput>,
    pub outcome: RunOutcome,
}

/// Coordinator state of the map phase. Only touched from serial tasks.
#[derive(Debug)]
enum PhaseState {
    Running { merged: usize },
    Completed,
    Aborted(JobError),
}

#[derive(Debug)]
struct MapPhase {
    results: MapResults,
    state: PhaseState,
    total: usize,
    stop_on_error: bool,
}

impl MapPhase {
    fn new(total: usize, stop_on_error: bool) -> Self {
        Self {
            results: MapResults::new(),
            state: PhaseState::Running { merged: 0 },
            total,
            stop_on_error,
        }
    }

    /// Merge one trace's output. Checking for an abort and counting the
    /// merge happen in the same transition, so at most one of completion and
    /// abort can ever fire.
    fn merge(&mut self, source_url: &str, subresults: TraceResults, queue: &WorkQueue) {
        let merged = match self.state {
            PhaseState::Running { merged } => merged,
            PhaseState::Completed | PhaseState::Aborted(_) => {
                debug!("ignoring results of {source_url}: map phase already finished");
                return;
            }
        };

        let failures = subresults.failures().len();
        self.results.merge(subresults);

        if self.stop_on_error && failures > 0 {
            let err = JobError::MapFailed {
                source_url: source_url.to_string(),
                failures,
            };
            warn!("aborting map phase: {err}");
            self.state = PhaseState::Aborted(err.clone());
            queue.stop(Some(err));
            return;
        }

        let merged = merged + 1;
        if merged == self.total {
            info!(traces = merged, "all traces merged");
            self.state = PhaseState::Completed;
            queue.stop(None);
        } else {
            self.state = PhaseState::Running { merged };
        }
    }
}

pub struct MapRunner {
    traces: Vec<Arc<dyn TraceHandle>>,
    workload: Workload,
    options: RunnerOptions,
    progress_reporter: Arc<dyn ProgressReporter>,
    output_formatters: Vec<Box<dyn OutputFormatter>>,
    queue: WorkQueue,
}

impl MapRunner {
    pub fn new(traces: Vec<Arc<dyn TraceHandle>>, workload: Workload, options: RunnerOptions) -> Self {
        let queue = WorkQueue::new(options.jobs.resolve());
        Self {
            traces,
            workload,
            options,
            progress_reporter: Arc::new(ConsoleProgressReporter::stdout()),
            output_formatters: vec![],
            queue,
        }
    }

    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = reporter;
        self
    }

    /// Register a formatter. Formatters run in registration order.
    pub fn with_output_formatter(mut self, formatter: Box<dyn OutputFormatter>) -> Self {
        self.output_formatters.push(formatter);
        self
    }

    pub fn num_workers(&self) -> usize {
        self.queue.num_workers()
    }

    /// Map every trace. Returns `None` if the workload has no map function.
    pub async fn run_mapper(&mut self) -> Option<MapperOutput> {
        let map_fn = self.workload.map_fn?;

        if self.traces.is_empty() {
            return Some(MapperOutput {
                results: MapResults::new(),
                outcome: RunOutcome::Completed,
            });
        }

        self.queue.reset().await;
        let phase = Arc::new(Mutex::new(MapPhase::new(
            self.traces.len(),
            self.options.stop_on_error,
        )));

        info!(
            traces = self.traces.len(),
            workers = self.queue.num_workers(),
            "starting map phase"
        );
        for trace in &self.traces {
            self.post_map_task(trace.clone(), map_fn, phase.clone());
        }

        let queue_result = self.queue.run().await;

        let mut phase = phase.lock();
        let results = std::mem::take(&mut phase.results);
        let outcome = match (&phase.state, queue_result) {
            (PhaseState::Completed, _) => RunOutcome::Completed,
            (PhaseState::Aborted(err), _) => RunOutcome::Aborted(err.clone()),
            (PhaseState::Running { merged }, Err(err)) => {
                error!(merged, "map phase stopped early: {err}");
                RunOutcome::Aborted(err)
            }
            (PhaseState::Running { merged }, Ok(())) => {
                // Only reachable if something other than the merge logic
                // stopped the queue without an error.
                let err = JobError::TaskPanicked(format!(
                    "map phase stopped after {merged} of {} traces",
                    phase.total
                ));
                error!("{err}");
                RunOutcome::Aborted(err)
            }
        };

        Some(MapperOutput { results, outcome })
    }

    fn post_map_task(&self, trace: Arc<dyn TraceHandle>, map_fn: MapFn, phase: Arc<Mutex<MapPhase>>) {
        let reporter = self.progress_reporter.clone();
        self.queue.post_any_task(move |queue| {
            reporter.will_run(trace.source_url());
            let subresults = map_single_trace(trace.as_ref(), map_fn);
            reporter.did_run(trace.source_url(), subresults.failures());

            queue.post_serial_task(move |queue| {
                phase.lock().merge(trace.source_url(), subresults, queue);
            });
        });
    }

    /// Reduce the given map outputs. Returns `Ok(None)` if the workload has no
    /// reduce function.
    ///
    /// Stage one reduces every key of every partial set in parallel. Stage two
    /// folds those per-set reductions into one value per key, serially.
    pub async fn run_reducer(
        &mut self,
        mapper_results: &[MapResults],
    ) -> Result<Option<JobResults>, JobError> {
        let Some(reduce_fn) = self.workload.reduce_fn else {
            return Ok(None);
        };

        self.queue.reset().await;

        // Stores stay alive until both stages are done.
        let mut stores: Vec<Arc<dyn TransientStore>> = Vec::with_capacity(mapper_results.len() + 1);
        let staged = Arc::new(Mutex::new(MapResults::new()));

        for mapper_result in mapper_results {
            let store = self.persist(mapper_result.results())?;

            let keys = store.keys();
            debug!(keys = keys.len(), "posting stage one reduce tasks");
            for key in keys {
                self.post_reduce_task(key, store.clone(), reduce_fn, staged.clone());
            }
            stores.push(store);
        }

        // FIFO dispatch means every reduce task is picked up before this one.
        self.queue.post_any_task(|queue| queue.stop(None));

        if let Err(err) = self.queue.run().await {
            error!("reduce phase stopped early: {err}");
            return Err(err);
        }

        let (staged_results, staged_failures) = std::mem::take(&mut *staged.lock()).into_parts();
        let store = self.persist(&staged_results)?;
        stores.push(store.clone());

        let mut results = JobResults::new();
        for mapper_result in mapper_results {
            results.extend_failures(mapper_result.failures().iter().cloned());
        }
        results.extend_failures(staged_failures);

        let stop_on_error = self.options.stop_on_error;
        let results = tokio::task::spawn_blocking(move || {
            fold_staged_results(results, store.as_ref(), reduce_fn, stop_on_error)
        })
        .await
        .map_err(|e| JobError::TaskPanicked(e.to_string()))??;

        drop(stores);
        info!(keys = results.results().len(), "reduce phase finished");
        Ok(Some(results))
    }

    fn persist(&self, entries: &BTreeMap<String, Vec<Value>>) -> Result<Arc<dyn TransientStore>, JobError> {
        store::persist(self.options.store, self.options.staging_dir.as_deref(), entries)
            .map_err(|e| JobError::Store(format!("{e:#}")))
    }

    fn post_reduce_task(
        &self,
        key: String,
        store: Arc<dyn TransientStore>,
        reduce_fn: ReduceFn,
        staged: Arc<Mutex<MapResults>>,
    ) {
        let stop_on_error = self.options.stop_on_error;
        self.queue.post_any_task(move |queue| {
            let outcome = reduce_map_results(&key, store.as_ref(), reduce_fn);
            queue.post_serial_task(move |queue| match outcome {
                Ok(value) => staged.lock().add_result(key, value),
                Err(failure) => {
                    if stop_on_error {
                        queue.stop(Some(JobError::ReduceFailed {
                            key,
                            description: failure.description.clone(),
                        }));
                    }
                    staged.lock().add_failure(failure);
                }
            });
        });
    }

    /// Run both phases, then hand the authoritative result to every formatter.
    pub async fn run(&mut self) -> RunOutput {
        let (results, outcome) = match self.run_mapper().await {
            None => (None, RunOutcome::Completed),
            Some(MapperOutput {
                results,
                outcome: outcome @ RunOutcome::Aborted(_),
            }) => {
                warn!("skipping reduce phase: map phase was aborted");
                (Some(JobOutput::Mapped(results)), outcome)
            }
            Some(MapperOutput { results, .. }) => {
                match self.run_reducer(std::slice::from_ref(&results)).await {
                    Ok(Some(reduced)) => (Some(JobOutput::Reduced(reduced)), RunOutcome::Completed),
                    Ok(None) => (Some(JobOutput::Mapped(results)), RunOutcome::Completed),
                    Err(err) => (Some(JobOutput::Mapped(results)), RunOutcome::Aborted(err)),
                }
            }
        };

        for formatter in &self.output_formatters {
            if let Err(e) = formatter.format(results.as_ref()) {
                error!("output formatter failed: {e:#}");
            }
        }

        RunOutput { results, outcome }
    }
}

/// Second reduce stage: fold every staged key into its final value.
fn fold_staged_results(
    mut results: JobResults,
    store: &dyn TransientStore,
    reduce_fn: ReduceFn,
    stop_on_error: bool,
) -> Result<JobResults, JobError> {
    for key in store.keys() {
        match reduce_map_results(&key, store, reduce_fn) {
            Ok(value) => {
                results.add_result(key, value);
            }
            Err(failure) => {
                if stop_on_error {
                    return Err(JobError::ReduceFailed {
                        key,
                        description: failure.description,
                    });
                }
                results.add_failure(failure);
            }
        }
    }
    Ok(results)
}
