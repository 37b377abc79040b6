//! Application assembly.

use docket_config::AppConfig;
use docket_core::DocketResult;
use docket_jobs::{JobQueueInterface, JobQueueManager, ResourceReclaimer, WorkerDispatcher};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// The running job engine: dispatcher, reclaimer and queue manager.
pub struct Application {
    config: AppConfig,
    reclaimer: Arc<ResourceReclaimer>,
    queue: Arc<JobQueueManager>,
}

impl Application {
    /// Builds the engine from configuration and starts its loops.
    pub async fn start(config: AppConfig) -> DocketResult<Self> {
        let dispatcher = Arc::new(WorkerDispatcher::new(config.dispatcher()));
        dispatcher.start()?;

        let reclaimer = Arc::new(ResourceReclaimer::new(config.reclamation_settings()));
        let queue = Arc::new(JobQueueManager::with_reclaimer(
            dispatcher,
            Arc::clone(&reclaimer),
        ));
        queue.configure(config.queue_settings()).await?;

        info!("Job engine started");
        Ok(Self {
            config,
            reclaimer,
            queue,
        })
    }

    /// Queue handle for the outer layers.
    pub fn queue(&self) -> Arc<dyn JobQueueInterface> {
        self.queue.clone()
    }

    /// Reclaimer that resource pools register with.
    pub fn reclaimer(&self) -> &Arc<ResourceReclaimer> {
        &self.reclaimer
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Reports engine statistics periodically until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.stats_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => self.report_stats(),
            }
        }
    }

    fn stats_interval(&self) -> Duration {
        self.config.jobs.reclamation.interval()
    }

    fn report_stats(&self) {
        let queue = self.queue.get_queue_stats();
        let dispatcher = self.queue.dispatcher().stats();
        info!(
            waiting = queue.waiting,
            processing = queue.processing,
            completed = queue.completed,
            failed = queue.failed,
            available_slots = queue.available_slots,
            io_active = dispatcher.io_active,
            cpu_active = dispatcher.cpu_active,
            "Job engine status"
        );
        if let Ok(json) = serde_json::to_string(&dispatcher) {
            debug!(stats = %json, "Dispatcher statistics");
        }
    }

    /// Stops the queue loops, then drains the dispatcher.
    pub async fn shutdown(&self) {
        info!("Shutting down job engine");
        JobQueueInterface::shutdown(self.queue.as_ref()).await;
        info!("Job engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_jobs::{JobContext, JobError, JobRequest, JobStatus, JobWork};
    use futures::FutureExt;
    use std::time::Instant;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_run_and_shutdown() {
        let mut config = AppConfig::default();
        config.jobs.dispatcher.io_workers = 2;
        config.jobs.dispatcher.cpu_workers = 1;
        config.jobs.queue.max_concurrent_jobs = 3;

        let app = Application::start(config).await.unwrap();
        let queue = app.queue();
        assert_eq!(queue.get_queue_stats().max_concurrent, 3);

        let work: JobWork = Arc::new(|ctx: JobContext| {
            async move {
                ctx.progress(1, 1)?;
                Ok::<(), JobError>(())
            }
            .boxed()
        });
        let position = queue
            .submit_job(JobRequest::new("7", "operator", "/uploads/report.pdf"), work)
            .unwrap();
        assert_eq!(position, 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let snapshot = queue.get_job_status_by_owner("7").unwrap();
            if snapshot.status == JobStatus::Completed {
                assert_eq!(snapshot.label, "report.pdf");
                break;
            }
            assert!(Instant::now() < deadline, "job did not complete");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        app.run_until(async {}).await;
        app.shutdown().await;
        assert!(!queue.get_queue_stats().running);
        assert!(!queue.get_dispatcher_stats().accepting);
    }
}
