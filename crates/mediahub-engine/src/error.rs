//! Application-level error taxonomy (spec §7), distinct from the substrate
//! errors it wraps so call sites can match on intent rather than re-deriving
//! it from a Redis or S3 error's shape.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The upload admission queue is saturated; caller must shed or back off.
    #[error("upload queue is full")]
    AdmissionFull,

    /// The caller's cancellation handle fired before or during the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// A substrate call (Redis, S3) failed in a way the owning loop should retry.
    #[error("transient substrate error: {0}")]
    Transient(#[source] anyhow::Error),

    /// The payload itself is unusable: malformed envelope, unknown extension,
    /// decode failure. Dropped with acknowledgement, never retried.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// The job exceeded `max_attempts`. Dropped with acknowledgement.
    #[error("retry attempts exhausted")]
    RetryExhausted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<redis::RedisError> for EngineError {
    fn from(err: redis::RedisError) -> Self {
        EngineError::Transient(err.into())
    }
}

impl EngineError {
    /// Whether this error should drive a retry (vs. being a permanent drop).
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_) | EngineError::Other(_))
    }
}
