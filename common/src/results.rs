//! Accumulators for map and reduce output.
//!
//! [`TraceResults`] is what a single map task writes into. The runner merges
//! every [`TraceResults`] into one job-wide [`MapResults`], and the reduce
//! phase folds that into [`JobResults`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A non-fatal error recorded for one input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Where the failure came from. A trace url for map failures, a key for
    /// reduce failures.
    pub source_url: String,

    /// Human readable error detail.
    pub description: String,
}

impl Failure {
    pub fn new(source_url: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            description: description.into(),
        }
    }

    /// Build a failure from an error, keeping its whole context chain.
    pub fn from_error(source_url: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::new(source_url, format!("{err:#}"))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source_url, self.description)
    }
}

/////////////////////////////////////////////////////////////////////////////
// Per-task output
/////////////////////////////////////////////////////////////////////////////

/// Output of mapping a single trace.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TraceResults {
    results: BTreeMap<String, Value>,
    failures: Vec<Failure>,
}

impl TraceResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value for `key`. A map task may only emit each key once.
    pub fn add_result(&mut self, key: impl Into<String>, value: Value) -> anyhow::Result<()> {
        match self.results.entry(key.into()) {
            Entry::Occupied(entry) => Err(anyhow!(
                "key `{}` was already emitted for this trace",
                entry.key()
            )),
            Entry::Vacant(entry) => {
                entry.insert(value);
                Ok(())
            }
        }
    }

    pub fn add_failure(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    pub fn results(&self) -> &BTreeMap<String, Value> {
        &self.results
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    #[inline]
    pub fn had_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/////////////////////////////////////////////////////////////////////////////
// Job-wide output
/////////////////////////////////////////////////////////////////////////////

/// Values grouped by key across many map tasks.
///
/// Value order within a key follows merge order, which is not deterministic
/// across runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MapResults {
    results: BTreeMap<String, Vec<Value>>,
    failures: Vec<Failure>,
}

impl MapResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every entry and failure of a task-local accumulator.
    pub fn merge(&mut self, subresults: TraceResults) {
        for (key, value) in subresults.results {
            self.results.entry(key).or_default().push(value);
        }
        self.failures.extend(subresults.failures);
    }

    /// Append a single value under `key`.
    pub fn add_result(&mut self, key: impl Into<String>, value: Value) {
        self.results.entry(key.into()).or_default().push(value);
    }

    pub fn add_failure(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    pub fn results(&self) -> &BTreeMap<String, Vec<Value>> {
        &self.results
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.failures.is_empty()
    }

    pub fn into_parts(self) -> (BTreeMap<String, Vec<Value>>, Vec<Failure>) {
        (self.results, self.failures)
    }
}

/// Reduced output, one value per key.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct JobResults {
    results: BTreeMap<String, Value>,
    failures: Vec<Failure>,
}

impl JobResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reduced value for `key`, returning the previous one if any.
    pub fn add_result(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.results.insert(key.into(), value)
    }

    pub fn add_failure(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    pub fn extend_failures(&mut self, failures: impl IntoIterator<Item = Failure>) {
        self.failures.extend(failures);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.results.get(key)
    }

    pub fn results(&self) -> &BTreeMap<String, Value> {
        &self.results
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }
}
