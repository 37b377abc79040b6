//! Common test infrastructure for queue integration tests.

#![allow(dead_code)]

use docket_jobs::{
    DispatcherConfig, JobQueueManager, JobRequest, JobStatus, JobStatusSnapshot, QueueSettings,
    ResourceReclaimer, WorkerDispatcher,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Dispatcher and manager wired together, torn down on `shutdown`.
pub struct TestQueue {
    pub dispatcher: Arc<WorkerDispatcher>,
    pub manager: JobQueueManager,
}

impl TestQueue {
    /// Starts a dispatcher with the given pool sizes and a configured manager.
    pub async fn start(io_workers: usize, cpu_workers: usize, settings: QueueSettings) -> Self {
        Self::with_reclaimer(
            io_workers,
            cpu_workers,
            settings,
            Arc::new(ResourceReclaimer::default()),
        )
        .await
    }

    pub async fn with_reclaimer(
        io_workers: usize,
        cpu_workers: usize,
        settings: QueueSettings,
        reclaimer: Arc<ResourceReclaimer>,
    ) -> Self {
        let dispatcher = Arc::new(WorkerDispatcher::new(DispatcherConfig::with_workers(
            io_workers,
            cpu_workers,
        )));
        dispatcher.start().expect("Failed to start dispatcher");

        let manager = JobQueueManager::with_reclaimer(Arc::clone(&dispatcher), reclaimer);
        manager
            .configure(settings)
            .await
            .expect("Failed to configure queue");

        Self {
            dispatcher,
            manager,
        }
    }

    /// Id of the most recent job of `owner_id`.
    pub fn job_id_of(&self, owner_id: &str) -> String {
        self.manager
            .get_status_by_owner(owner_id)
            .expect("Owner has no job")
            .job_id
            .to_string()
    }

    /// Polls until the job matches `predicate` or `timeout` elapses.
    pub async fn wait_until<P>(&self, job_id: &str, timeout: Duration, predicate: P) -> JobStatusSnapshot
    where
        P: Fn(&JobStatusSnapshot) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let snapshot = self.manager.get_status(job_id).expect("Job not found");
            if predicate(&snapshot) {
                return snapshot;
            }
            assert!(
                Instant::now() < deadline,
                "Timed out waiting on job {job_id}, last status {}",
                snapshot.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Polls until the job reaches `status`.
    pub async fn wait_for_status(&self, job_id: &str, status: JobStatus) -> JobStatusSnapshot {
        self.wait_until(job_id, Duration::from_secs(5), |s| s.status == status)
            .await
    }

    pub async fn shutdown(self) {
        self.manager.shutdown().await;
        self.dispatcher.shutdown().await;
    }
}

/// Request for a document owned by `owner_id`.
pub fn request(owner_id: &str) -> JobRequest {
    JobRequest::new(owner_id, format!("user {owner_id}"), format!("/uploads/{owner_id}.pptx"))
}

/// Queue settings without retry backoff.
pub fn settings(max_concurrent_jobs: usize, retry_limit: u32) -> QueueSettings {
    QueueSettings::new(max_concurrent_jobs, Duration::from_secs(30), retry_limit)
        .with_retry_policy(docket_jobs::RetryPolicy::none())
}
