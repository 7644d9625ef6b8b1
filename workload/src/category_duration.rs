//! A MapReduce-compatible application that computes the total duration of
//! complete events per category, in microseconds.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde_json::Value;

use common::utils::sum_numbers;
use common::{TraceHandle, TraceResults};

use crate::trace_events;

const UNCATEGORIZED: &str = "<uncategorized>";

pub fn map(results: &mut TraceResults, trace: &dyn TraceHandle) -> Result<()> {
    let events = trace_events::parse(&trace.read()?)?;

    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for event in events {
        let Some(dur) = event.dur else { continue };
        if dur < 0.0 {
            return Err(anyhow!(
                "event `{}` has a negative duration",
                event.name.unwrap_or_default()
            ));
        }
        let category = event.cat.unwrap_or_else(|| UNCATEGORIZED.to_string());
        *totals.entry(category).or_default() += dur;
    }

    for (category, total) in totals {
        results.add_result(category, Value::from(total))?;
    }
    Ok(())
}

pub fn reduce(_key: &str, values: Vec<Value>) -> Result<Value> {
    sum_numbers(&values)
}
