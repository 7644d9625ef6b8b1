use std::sync::Arc;

use anyhow::{anyhow, Error};
use glob::glob;
use tracing::{debug, warn};

use common::{FileTraceHandle, TraceHandle};

/// Build a trace handle for every file matching `pattern`, in path order.
pub fn discover_traces(pattern: &str) -> Result<Vec<Arc<dyn TraceHandle>>, Error> {
    let paths = glob(pattern).map_err(|e| anyhow!("invalid input pattern `{pattern}`: {e}"))?;

    let mut traces: Vec<Arc<dyn TraceHandle>> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => {
                debug!(path = %path.display(), "found trace");
                traces.push(Arc::new(FileTraceHandle::new(path)));
            }
            Ok(_) => {}
            Err(e) => warn!("skipping unreadable path: {e}"),
        }
    }
    Ok(traces)
}
