//! Users can specify map and reduce functions over a batch of performance
//! traces, and then run them locally on a bounded pool of workers. Partial
//! results are merged by key and, if a reduce function is given, folded into
//! a single answer per key.

use serde_json::Value;

pub mod results;
pub mod trace;
pub mod utils;

pub use results::{Failure, JobResults, MapResults, TraceResults};
pub use trace::{FileTraceHandle, InMemoryTraceHandle, TraceHandle};

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// A map function receives a fresh, task-local accumulator and the trace it
/// is responsible for.
///
/// Returning an error does not fail the job. The runner records it as a
/// [`Failure`] on the accumulator, next to whatever results were already added.
pub type MapFn = fn(results: &mut TraceResults, trace: &dyn TraceHandle) -> anyhow::Result<()>;

/// A reduce function takes in a key and every partial value collected for
/// that key. It returns an [`anyhow::Result`] containing a single output value.
///
/// The same function runs in both reduce stages, so it has to accept its own
/// outputs as inputs (a sum of sums is still a sum).
pub type ReduceFn = fn(key: &str, values: Vec<Value>) -> anyhow::Result<Value>;

/// A map reduce application.
///
/// Either function may be absent, which disables the matching phase.
#[derive(Copy, Clone, Default)]
pub struct Workload {
    pub map_fn: Option<MapFn>,
    pub reduce_fn: Option<ReduceFn>,
}

impl Workload {
    /// Construct a workload with both phases.
    pub fn new(map_fn: MapFn, reduce_fn: ReduceFn) -> Self {
        Self {
            map_fn: Some(map_fn),
            reduce_fn: Some(reduce_fn),
        }
    }

    /// Construct a workload that only maps.
    pub fn map_only(map_fn: MapFn) -> Self {
        Self {
            map_fn: Some(map_fn),
            reduce_fn: None,
        }
    }
}

impl std::fmt::Debug for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workload")
            .field("map_fn", &self.map_fn.is_some())
            .field("reduce_fn", &self.reduce_fn.is_some())
            .finish()
    }
}
