//! A MapReduce-compatible application that counts how many times each
//! event name occurs across all traces.

use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::Value;

use common::utils::sum_numbers;
use common::{TraceHandle, TraceResults};

use crate::trace_events;

pub fn map(results: &mut TraceResults, trace: &dyn TraceHandle) -> Result<()> {
    let events = trace_events::parse(&trace.read()?)?;

    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for event in events {
        // Unnamed events (metadata, counters without a name) are skipped.
        if let Some(name) = event.name {
            *counts.entry(name).or_default() += 1;
        }
    }

    for (name, count) in counts {
        results.add_result(name, Value::from(count))?;
    }
    Ok(())
}

pub fn reduce(_key: &str, values: Vec<Value>) -> Result<Value> {
    sum_numbers(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::InMemoryTraceHandle;
    use serde_json::json;

    #[test]
    fn counts_events_by_name() {
        let trace = InMemoryTraceHandle::new(
            "mem://t1",
            r#"[{"name": "paint"}, {"name": "layout"}, {"name": "paint"}, {"ph": "M"}]"#,
        );
        let mut results = TraceResults::new();
        map(&mut results, &trace).unwrap();

        assert_eq!(results.results()["paint"], json!(2));
        assert_eq!(results.results()["layout"], json!(1));
        assert_eq!(results.results().len(), 2);
    }

    #[test]
    fn reduce_is_a_sum_of_sums() {
        let stage_one = reduce("paint", vec![json!(2), json!(5)]).unwrap();
        assert_eq!(reduce("paint", vec![stage_one]).unwrap(), json!(7));
    }
}
