//! Map-only application: reports the number of events in each trace, keyed
//! by the trace's url.

use anyhow::Result;
use serde_json::Value;

use common::{TraceHandle, TraceResults};

use crate::trace_events;

pub fn map(results: &mut TraceResults, trace: &dyn TraceHandle) -> Result<()> {
    let events = trace_events::parse(&trace.read()?)?;
    results.add_result(trace.source_url(), Value::from(events.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::InMemoryTraceHandle;
    use serde_json::json;

    #[test]
    fn keys_by_source_url() {
        let trace = InMemoryTraceHandle::new("mem://big", r#"[{}, {}, {}]"#);
        let mut results = TraceResults::new();
        map(&mut results, &trace).unwrap();
        assert_eq!(results.results()["mem://big"], json!(3));
    }
}
