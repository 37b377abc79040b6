//! Job error types.

use docket_core::DocketError;
use std::time::Duration;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job and dispatcher errors.
///
/// Errors are `Clone` because a task's failure is stored on the task and
/// handed to every observer of its terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Admission rejected, the queue is at capacity.
    #[error("Queue is full: {active} active and {waiting} waiting jobs, limit is {max}")]
    QueueFull {
        active: usize,
        waiting: usize,
        max: usize,
    },

    /// `submit` was called before `configure`.
    #[error("Job queue has not been configured")]
    NotConfigured,

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The job belongs to another owner.
    #[error("Job {job_id} does not belong to owner {owner_id}")]
    NotOwner { job_id: String, owner_id: String },

    /// Unit of work failed.
    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    /// Unit of work exceeded its time budget.
    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    /// Unit of work observed a cancellation request and stopped.
    #[error("Job was cancelled")]
    Cancelled,

    /// A timeout of zero was supplied.
    #[error("Timeout must be greater than zero")]
    InvalidTimeout,

    /// A task with the same id is still pending or running.
    #[error("Task id already in use: {0}")]
    DuplicateTask(String),

    /// The dispatcher is not accepting work.
    #[error("Dispatcher is not running")]
    DispatcherStopped,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Resource reclamation failed.
    #[error("Resource reclamation failed: {0}")]
    Reclamation(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Creates an execution failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed(message.into())
    }

    /// Returns true if a job failing with this error may be re-admitted.
    ///
    /// Cancellation and caller-contract violations are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            JobError::Cancelled
                | JobError::QueueFull { .. }
                | JobError::NotConfigured
                | JobError::NotOwner { .. }
                | JobError::InvalidTimeout
                | JobError::DuplicateTask(_)
                | JobError::Configuration(_)
        )
    }

    /// Returns true for the timeout variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, JobError::Timeout(_))
    }
}

impl From<JobError> for DocketError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::QueueFull { .. } => DocketError::Busy(err.to_string()),
            JobError::NotFound(id) => DocketError::not_found("job", id),
            JobError::NotOwner { .. } => DocketError::Forbidden(err.to_string()),
            JobError::NotConfigured | JobError::Configuration(_) => {
                DocketError::Configuration(err.to_string())
            }
            JobError::InvalidTimeout | JobError::DuplicateTask(_) => {
                DocketError::Validation(err.to_string())
            }
            JobError::Timeout(_) => DocketError::Timeout(err.to_string()),
            JobError::ExecutionFailed(_)
            | JobError::Cancelled
            | JobError::DispatcherStopped
            | JobError::Reclamation(_)
            | JobError::Internal(_) => DocketError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_execution_failed() {
        assert!(JobError::failed("oops").is_retryable());
    }

    #[test]
    fn test_is_retryable_timeout() {
        let err = JobError::Timeout(Duration::from_secs(30));
        assert!(err.is_retryable());
        assert!(err.is_timeout());
    }

    #[test]
    fn test_is_not_retryable_cancelled() {
        assert!(!JobError::Cancelled.is_retryable());
        assert!(!JobError::Cancelled.is_timeout());
    }

    #[test]
    fn test_contract_errors_are_final() {
        assert!(!JobError::NotConfigured.is_retryable());
        assert!(!JobError::Configuration("bad".into()).is_retryable());
        assert!(JobError::Internal("glitch".into()).is_retryable());
    }

    #[test]
    fn test_queue_full_display() {
        let err = JobError::QueueFull {
            active: 2,
            waiting: 8,
            max: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("2 active") && msg.contains("limit is 10"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_display_is_tagged() {
        let err = JobError::Timeout(Duration::from_secs(1));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_into_docket_error() {
        let busy: DocketError = JobError::QueueFull {
            active: 1,
            waiting: 0,
            max: 1,
        }
        .into();
        assert_eq!(busy.status_code(), 429);

        let forbidden: DocketError = JobError::NotOwner {
            job_id: "job_1".into(),
            owner_id: "42".into(),
        }
        .into();
        assert_eq!(forbidden.status_code(), 403);

        let missing: DocketError = JobError::NotFound("job_x".into()).into();
        assert_eq!(missing.error_code(), "NOT_FOUND");
    }
}
