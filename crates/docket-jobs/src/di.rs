//! Dependency injection interfaces for the jobs module.
//!
//! Provides a Shaku-compatible interface over the job queue so outer layers
//! depend on a trait object rather than the concrete manager.

use crate::dispatcher::DispatcherStats;
use crate::error::JobResult;
use crate::job::{JobRequest, JobStatusSnapshot, JobWork};
use crate::manager::{JobQueueManager, MaintenanceReport, QueueSettings, QueueStats};
use async_trait::async_trait;
use docket_core::Interface;

/// Interface for job queue operations.
#[async_trait]
pub trait JobQueueInterface: Interface + Send + Sync {
    /// Applies settings and (re)starts the queue loops.
    async fn configure(&self, settings: QueueSettings) -> JobResult<()>;

    /// Submits a job, returning its 1-based position among waiting jobs.
    fn submit_job(&self, request: JobRequest, work: JobWork) -> JobResult<usize>;

    /// Get job status by id.
    fn get_job_status(&self, job_id: &str) -> Option<JobStatusSnapshot>;

    /// Get the most recent job of an owner.
    fn get_job_status_by_owner(&self, owner_id: &str) -> Option<JobStatusSnapshot>;

    /// Get every retained job of an owner, oldest first.
    fn jobs_for_owner(&self, owner_id: &str) -> Vec<JobStatusSnapshot>;

    /// Get queue statistics.
    fn get_queue_stats(&self) -> QueueStats;

    /// Get worker dispatcher statistics.
    fn get_dispatcher_stats(&self) -> DispatcherStats;

    /// Cancel a job owned by `owner_id`.
    fn cancel_job(&self, job_id: &str, owner_id: &str) -> JobResult<bool>;

    /// Runs one maintenance cycle immediately.
    async fn run_maintenance(&self) -> MaintenanceReport;

    /// Stops the queue loops and the dispatcher.
    async fn shutdown(&self);
}

#[async_trait]
impl JobQueueInterface for JobQueueManager {
    async fn configure(&self, settings: QueueSettings) -> JobResult<()> {
        JobQueueManager::configure(self, settings).await
    }

    fn submit_job(&self, request: JobRequest, work: JobWork) -> JobResult<usize> {
        self.submit_work(request, work)
    }

    fn get_job_status(&self, job_id: &str) -> Option<JobStatusSnapshot> {
        self.get_status(job_id)
    }

    fn get_job_status_by_owner(&self, owner_id: &str) -> Option<JobStatusSnapshot> {
        self.get_status_by_owner(owner_id)
    }

    fn jobs_for_owner(&self, owner_id: &str) -> Vec<JobStatusSnapshot> {
        JobQueueManager::jobs_for_owner(self, owner_id)
    }

    fn get_queue_stats(&self) -> QueueStats {
        JobQueueManager::get_queue_stats(self)
    }

    fn get_dispatcher_stats(&self) -> DispatcherStats {
        self.dispatcher().stats()
    }

    fn cancel_job(&self, job_id: &str, owner_id: &str) -> JobResult<bool> {
        self.cancel(job_id, owner_id)
    }

    async fn run_maintenance(&self) -> MaintenanceReport {
        JobQueueManager::run_maintenance(self).await
    }

    async fn shutdown(&self) {
        JobQueueManager::shutdown(self).await;
        self.dispatcher().shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatcherConfig;
    use crate::dispatcher::WorkerDispatcher;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_manager_behind_interface() {
        let dispatcher = Arc::new(WorkerDispatcher::new(DispatcherConfig::with_workers(1, 1)));
        dispatcher.start().unwrap();
        let queue: Arc<dyn JobQueueInterface> = Arc::new(JobQueueManager::new(dispatcher));

        queue
            .configure(QueueSettings::new(2, std::time::Duration::from_secs(5), 0))
            .await
            .unwrap();

        let stats = queue.get_queue_stats();
        assert!(stats.running);
        assert_eq!(stats.max_concurrent, 2);
        assert!(queue.get_job_status("job_missing").is_none());
        assert!(queue.get_dispatcher_stats().accepting);

        queue.shutdown().await;
        assert!(!queue.get_queue_stats().running);
    }
}
