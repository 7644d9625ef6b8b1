use anyhow::{anyhow, Result};
use bytes::Bytes;
use serde::Deserialize;

/// The subset of a trace event the workloads care about.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceEvent {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub cat: Option<String>,

    /// Duration in microseconds, only present on complete events.
    #[serde(default)]
    pub dur: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TraceFile {
    Array(Vec<TraceEvent>),
    Object {
        #[serde(rename = "traceEvents")]
        trace_events: Vec<TraceEvent>,
    },
}

/// Parse the events out of a raw trace.
pub fn parse(data: &Bytes) -> Result<Vec<TraceEvent>> {
    let trace: TraceFile = serde_json::from_slice(data)
        .map_err(|e| anyhow!("trace is not in the trace event format: {}", e))?;
    Ok(match trace {
        TraceFile::Array(events) => events,
        TraceFile::Object { trace_events } => trace_events,
    })
}
