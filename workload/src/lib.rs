//! Map reduce applications over performance traces.
//!
//! Every workload reads a trace in the Chrome trace event format, either a
//! bare array of events or an object with a `traceEvents` array.

use common::Workload;

pub mod category_duration;
pub mod event_count;
pub mod trace_events;
pub mod trace_size;

/// Names of every workload known to [`try_named`].
pub const WORKLOADS: &[&str] = &["event_count", "category_duration", "trace_size"];

/// Look up a workload by name.
pub fn try_named(name: &str) -> Option<Workload> {
    match name {
        "event_count" => Some(Workload::new(event_count::map, event_count::reduce)),
        "category_duration" => Some(Workload::new(
            category_duration::map,
            category_duration::reduce,
        )),
        "trace_size" => Some(Workload::map_only(trace_size::map)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_workload_resolves() {
        for name in WORKLOADS {
            assert!(try_named(name).is_some(), "{name} should resolve");
        }
        assert!(try_named("word_count").is_none());
    }

    #[test]
    fn trace_size_has_no_reduce() {
        let workload = try_named("trace_size").unwrap();
        assert!(workload.map_fn.is_some());
        assert!(workload.reduce_fn.is_none());
    }
}
