//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A task with the same identifier is already queued.
    #[error("task {0} already in queue")]
    DuplicateTask(String),
    /// Batch enqueue skipped one or more duplicates.
    #[error("enqueue errors: {}", .0.join("; "))]
    DuplicatesSkipped(Vec<String>),
    /// No admission slot is free right now.
    #[error("admission exhausted for {0}")]
    AdmissionExhausted(String),
    /// Retry count reached the configured maximum.
    #[error("max retries reached: {0}")]
    RetryExhausted(String),
    /// Error matched the permanent vocabulary and must not be retried.
    #[error("permanent error: {0}")]
    PermanentError(String),
    /// A retry was attempted before the backoff window elapsed.
    #[error("still in backoff period")]
    BackoffActive,
    /// Any other execution error; drives a backoff-computed retry.
    #[error("transient failure: {0}")]
    TransientFailure(String),
    /// The loop was cancelled by its caller.
    #[error("scheduler cancelled")]
    Cancelled,
    /// The loop was already started or has stopped.
    #[error("scheduler already started")]
    AlreadyStarted,
    /// The admission controller was closed while waiting for a slot.
    #[error("admission controller closed")]
    ControllerClosed,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
