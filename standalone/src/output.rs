//! Output formatters, applied once at the end of a run.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Error};
use itertools::Itertools;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use common::{Failure, JobResults, MapResults};

/// The authoritative result of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum JobOutput {
    /// No reduce ran; values are grouped by key.
    Mapped(MapResults),
    /// The reduce phase produced one value per key.
    Reduced(JobResults),
}

impl JobOutput {
    pub fn failures(&self) -> &[Failure] {
        match self {
            JobOutput::Mapped(results) => results.failures(),
            JobOutput::Reduced(results) => results.failures(),
        }
    }

    pub fn as_reduced(&self) -> Option<&JobResults> {
        match self {
            JobOutput::Reduced(results) => Some(results),
            JobOutput::Mapped(_) => None,
        }
    }

    pub fn as_mapped(&self) -> Option<&MapResults> {
        match self {
            JobOutput::Mapped(results) => Some(results),
            JobOutput::Reduced(_) => None,
        }
    }
}

/// Receives the final result. `None` means no phase produced anything, which
/// formatters have to accept.
pub trait OutputFormatter: Send + Sync {
    fn format(&self, results: Option<&JobOutput>) -> Result<(), Error>;
}

/////////////////////////////////////////////////////////////////////////////
// JSON
/////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
enum Destination {
    Stdout,
    File(PathBuf),
}

/// Writes the result as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    destination: Destination,
}

impl JsonFormatter {
    pub fn stdout() -> Self {
        Self {
            destination: Destination::Stdout,
        }
    }

    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            destination: Destination::File(path.into()),
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, results: Option<&JobOutput>) -> Result<(), Error> {
        match &self.destination {
            Destination::Stdout => {
                let mut out = io::stdout().lock();
                serde_json::to_writer_pretty(&mut out, &results)?;
                writeln!(out)?;
            }
            Destination::File(path) => {
                let file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                let mut out = BufWriter::new(file);
                serde_json::to_writer_pretty(&mut out, &results)?;
                writeln!(out)?;
                out.flush()?;
            }
        }
        Ok(())
    }
}

/////////////////////////////////////////////////////////////////////////////
// Plain text
/////////////////////////////////////////////////////////////////////////////

/// Writes one `key: value` line per key, followed by any failures.
#[derive(Debug)]
pub struct SummaryFormatter<W> {
    out: Mutex<W>,
}

impl SummaryFormatter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> SummaryFormatter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> OutputFormatter for SummaryFormatter<W> {
    fn format(&self, results: Option<&JobOutput>) -> Result<(), Error> {
        let mut out = self.out.lock();
        let Some(results) = results else {
            writeln!(out, "no results")?;
            return Ok(());
        };

        match results {
            JobOutput::Mapped(mapped) => {
                for (key, values) in mapped.results() {
                    writeln!(out, "{key}: [{}]", values.iter().map(Value::to_string).join(", "))?;
                }
            }
            JobOutput::Reduced(reduced) => {
                for (key, value) in reduced.results() {
                    writeln!(out, "{key}: {value}")?;
                }
            }
        }

        let failures = results.failures();
        if !failures.is_empty() {
            writeln!(out, "{} failure(s):", failures.len())?;
            for failure in failures {
                writeln!(out, "  {failure}")?;
            }
        }
        out.flush()?;
        Ok(())
    }
}
