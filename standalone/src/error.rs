use thiserror::Error;

/// Terminal errors of a run.
///
/// Per-trace problems are not errors; they are recorded as
/// [`common::Failure`]s. A `JobError` only exists once a failure policy or a
/// broken invariant decides the whole phase has to stop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Stop-on-error is enabled and a merged trace carried failures.
    #[error("mapping error: {source_url} recorded {failures} failure(s)")]
    MapFailed { source_url: String, failures: usize },

    /// Stop-on-error is enabled and reducing a key failed.
    #[error("reduce error: key `{key}`: {description}")]
    ReduceFailed { key: String, description: String },

    /// A task panicked outside of the map/reduce collaborators.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// Partial results could not be handed off to the reduce stage.
    #[error("failed to stage partial results: {0}")]
    Store(String),
}
