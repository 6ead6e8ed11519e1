//! Job error types.

use murmur_core::MurmurError;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Queue and scheduler errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Queue is at capacity. Surfaced to producers as backpressure.
    #[error("Queue is full: {0}")]
    QueueFull(String),

    /// Queue provider was closed.
    #[error("Queue provider is closed")]
    QueueClosed,

    /// The caller's cancellation token fired first.
    #[error("Operation was cancelled")]
    Cancelled,

    /// Job attempt timed out.
    #[error("Job timed out after {0} ms")]
    Timeout(u64),

    /// Job execution failed.
    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// A job with this name is already registered.
    #[error("Job already registered: {0}")]
    AlreadyRegistered(String),

    /// Scheduler error.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Returns true if this error is retryable.
    ///
    /// Capacity and closed-provider errors are signals to the caller, never
    /// transient failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::ExecutionFailed(_) | JobError::Timeout(_))
    }

    /// Returns a short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::QueueFull(_) => "queue_full",
            JobError::QueueClosed => "queue_closed",
            JobError::Cancelled => "cancelled",
            JobError::Timeout(_) => "timeout",
            JobError::ExecutionFailed(_) => "execution_failed",
            JobError::NotFound(_) => "not_found",
            JobError::AlreadyRegistered(_) => "already_registered",
            JobError::Scheduler(_) => "scheduler",
            JobError::Configuration(_) => "configuration",
            JobError::Serialization(_) => "serialization",
            JobError::Internal(_) => "internal",
        }
    }
}

impl From<MurmurError> for JobError {
    fn from(err: MurmurError) -> Self {
        match err {
            MurmurError::Serialization(e) => JobError::Serialization(e),
            MurmurError::Configuration(msg) => JobError::Configuration(msg),
            MurmurError::NotFound { .. } => JobError::NotFound(err.to_string()),
            other => JobError::ExecutionFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_execution_failed() {
        assert!(JobError::ExecutionFailed("oops".into()).is_retryable());
        assert!(JobError::Timeout(500).is_retryable());
    }

    #[test]
    fn test_signals_are_not_retryable() {
        assert!(!JobError::QueueFull("deliveries".into()).is_retryable());
        assert!(!JobError::QueueClosed.is_retryable());
        assert!(!JobError::Cancelled.is_retryable());
    }

    #[test]
    fn test_from_murmur_error() {
        let job_err = JobError::from(MurmurError::database("connection reset"));
        match job_err {
            JobError::ExecutionFailed(msg) => assert!(msg.contains("connection reset")),
            other => panic!("Expected ExecutionFailed, got {other:?}"),
        }

        let job_err = JobError::from(MurmurError::Configuration("bad".into()));
        assert!(matches!(job_err, JobError::Configuration(_)));
    }

    #[test]
    fn test_error_display_timeout() {
        let err = JobError::Timeout(1500);
        assert!(err.to_string().contains("1500"));
        assert_eq!(err.kind(), "timeout");
    }
}
