//! Execution context handed to each job attempt.

use crate::error::{JobError, JobResult};
use crate::job::{JobId, LogLevel};
use crate::manager::QueueCore;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

/// Context of one job attempt.
///
/// Progress reports and log entries from an attempt that is no longer current
/// (it timed out or the job was canceled) are ignored by the queue.
#[derive(Clone)]
pub struct JobContext {
    job_id: JobId,
    owner_id: String,
    payload_ref: String,
    payload: Option<Arc<serde_json::Value>>,
    attempt: u32,
    token: CancellationToken,
    queue: Weak<QueueCore>,
}

impl JobContext {
    pub(crate) fn new(
        job_id: JobId,
        owner_id: String,
        payload_ref: String,
        payload: Option<Arc<serde_json::Value>>,
        attempt: u32,
        token: CancellationToken,
        queue: Weak<QueueCore>,
    ) -> Self {
        Self {
            job_id,
            owner_id,
            payload_ref,
            payload,
            attempt,
            token,
            queue,
        }
    }

    /// Creates a context not attached to any queue.
    ///
    /// Useful for exercising a unit of work in isolation; progress reports
    /// only check the token.
    pub fn detached(
        job_id: impl Into<JobId>,
        payload: Option<serde_json::Value>,
        token: CancellationToken,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            owner_id: String::new(),
            payload_ref: String::new(),
            payload: payload.map(Arc::new),
            attempt: 1,
            token,
            queue: Weak::new(),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// File or payload reference given at submission.
    pub fn payload_ref(&self) -> &str {
        &self.payload_ref
    }

    /// Payload parameters given at submission.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_deref()
    }

    /// Attempt number, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reports `current` of `total` sub-units done.
    ///
    /// Returns `Err(JobError::Cancelled)` once cancellation was requested or
    /// the attempt timed out; propagate it with `?` to unwind the work.
    pub fn progress(&self, current: u64, total: u64) -> JobResult<()> {
        if let Some(queue) = self.queue.upgrade() {
            queue.record_progress(&self.job_id, self.attempt, current, total);
        }

        if self.should_cancel() {
            return Err(JobError::Cancelled);
        }
        Ok(())
    }

    /// Returns true once the attempt should stop.
    pub fn should_cancel(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the attempt should stop.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Appends an entry to the job's log trail.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        if let Some(queue) = self.queue.upgrade() {
            queue.append_log(&self.job_id, self.attempt, level, message.into());
        }
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.job_id)
            .field("owner_id", &self.owner_id)
            .field("attempt", &self.attempt)
            .field("cancelled", &self.should_cancel())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_progress_until_cancelled() {
        let token = CancellationToken::new();
        let ctx = JobContext::detached(
            "job_1",
            Some(serde_json::json!({"target": "zh"})),
            token.clone(),
        );

        assert!(ctx.progress(1, 4).is_ok());
        assert_eq!(ctx.payload().unwrap()["target"], "zh");
        assert_eq!(ctx.attempt(), 1);

        token.cancel();
        assert!(ctx.should_cancel());
        assert_eq!(ctx.progress(2, 4), Err(JobError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_resolves() {
        let token = CancellationToken::new();
        let ctx = JobContext::detached("job_2", None, token.clone());
        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.cancelled().await }
        });
        token.cancel();
        waiter.await.unwrap();
        assert!(ctx.should_cancel());
    }
}
