use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use common::{Failure, MapFn, TraceHandle, TraceResults};

/// Map a single trace into a fresh accumulator.
///
/// Nothing escapes this function: an error returned by the map function, or
/// a panic inside it, becomes a [`Failure`] on the returned accumulator.
pub fn map_single_trace(trace: &dyn TraceHandle, map_fn: MapFn) -> TraceResults {
    let mut results = TraceResults::new();
    let source_url = trace.source_url();

    debug!("Will run {source_url}");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| map_fn(&mut results, trace)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => results.add_failure(Failure::from_error(source_url, &e)),
        Err(payload) => results.add_failure(Failure::new(
            source_url,
            format!("map function panicked: {}", panic_message(payload.as_ref())),
        )),
    }

    if results.had_failures() {
        warn!("Failure while mapping {source_url}");
        for failure in results.failures() {
            warn!("  {}", failure.description);
        }
    }

    results
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use common::InMemoryTraceHandle;
    use serde_json::json;

    fn emits_one(results: &mut TraceResults, _: &dyn TraceHandle) -> anyhow::Result<()> {
        results.add_result("x", json!(1))
    }

    fn fails_after_emitting(results: &mut TraceResults, _: &dyn TraceHandle) -> anyhow::Result<()> {
        results.add_result("partial", json!(true))?;
        Err(anyhow!("corrupt trace"))
    }

    fn panics(_: &mut TraceResults, _: &dyn TraceHandle) -> anyhow::Result<()> {
        panic!("index out of range")
    }

    #[test]
    fn successful_map_has_no_failures() {
        let trace = InMemoryTraceHandle::new("mem://a", "");
        let results = map_single_trace(&trace, emits_one);
        assert_eq!(results.results()["x"], json!(1));
        assert!(!results.had_failures());
    }

    #[test]
    fn errors_become_failures_and_keep_partial_results() {
        let trace = InMemoryTraceHandle::new("mem://b", "");
        let results = map_single_trace(&trace, fails_after_emitting);
        assert_eq!(results.results()["partial"], json!(true));
        assert_eq!(results.failures(), &[Failure::new("mem://b", "corrupt trace")]);
    }

    #[test]
    fn panics_become_failures() {
        let trace = InMemoryTraceHandle::new("mem://c", "");
        let results = map_single_trace(&trace, panics);
        assert_eq!(results.failures().len(), 1);
        assert_eq!(results.failures()[0].source_url, "mem://c");
        assert!(results.failures()[0].description.contains("index out of range"));
    }
}
