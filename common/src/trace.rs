//! Handles to the traces a job maps over.

use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Error};
use bytes::Bytes;
use tracing::debug;

/// One unit of work to map.
///
/// Handles are shared read-only between the caller and the map tasks for the
/// whole run, so they must be cheap to share across threads.
pub trait TraceHandle: Send + Sync + fmt::Debug {
    /// A stable, human readable identifier used in logs and failures.
    fn source_url(&self) -> &str;

    /// Load the raw trace contents.
    fn read(&self) -> Result<Bytes, Error>;
}

/// A trace stored in a local file.
#[derive(Debug, Clone)]
pub struct FileTraceHandle {
    path: PathBuf,
    source_url: String,
}

impl FileTraceHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let absolute = std::path::absolute(&path).unwrap_or_else(|_| path.clone());
        let source_url = format!("file://{}", absolute.display());
        Self { path, source_url }
    }
}

impl TraceHandle for FileTraceHandle {
    fn source_url(&self) -> &str {
        &self.source_url
    }

    fn read(&self) -> Result<Bytes, Error> {
        debug!(path = %self.path.display(), "reading trace");
        let data = std::fs::read(&self.path)
            .map_err(|e| anyhow!("failed to read {}: {}", self.path.display(), e))?;
        Ok(Bytes::from(data))
    }
}

/// A trace already held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryTraceHandle {
    source_url: String,
    data: Bytes,
}

impl InMemoryTraceHandle {
    pub fn new(source_url: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            source_url: source_url.into(),
            data: data.into(),
        }
    }
}

impl TraceHandle for InMemoryTraceHandle {
    fn source_url(&self) -> &str {
        &self.source_url
    }

    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    fn read(&self) -> Result<Bytes, Error> {
        Ok(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_handle_reads_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        std::fs::write(&path, b"[]").unwrap();

        let handle = FileTraceHandle::new(&path);
        assert!(handle.source_url().starts_with("file://"));
        assert!(handle.source_url().ends_with("a.json"));
        assert_eq!(handle.read().unwrap(), Bytes::from_static(b"[]"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let handle = FileTraceHandle::new("/definitely/not/here.json");
        let err = handle.read().unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
