//! Job queue manager.
//!
//! Admission control, retry policy and job bookkeeping on top of the
//! [`WorkerDispatcher`]. Admission is bounded by `max_concurrent_jobs`
//! (waiting plus processing), independently of the dispatcher's pool sizes.
//! A scheduling loop promotes the lowest `(priority, arrival)` waiting job
//! whenever fewer than `max_concurrent_jobs` are processing.

use crate::config::QueueConfig;
use crate::context::JobContext;
use crate::dispatcher::WorkerDispatcher;
use crate::error::{JobError, JobResult};
use crate::job::{Job, JobId, JobRequest, JobStatus, JobStatusSnapshot, JobWork, LogLevel};
use crate::metrics::JobMetrics;
use crate::reclamation::{ReclamationReport, ResourceReclaimer};
use crate::retry::RetryPolicy;
use crate::task::{Task, TaskOptions, TaskStatus, WorkloadClass};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest the scheduling loop sleeps without a wake-up signal.
const SCHEDULER_IDLE_WAIT: Duration = Duration::from_secs(1);

/// Runtime settings of the queue.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Admission ceiling: waiting plus processing jobs.
    pub max_concurrent_jobs: usize,
    /// Wall-clock budget of one attempt.
    pub job_timeout: Duration,
    /// How many times a failed job is re-admitted.
    pub retry_limit: u32,
    /// Backoff between attempts.
    pub retry_policy: RetryPolicy,
    /// Log trail entries kept per job.
    pub log_capacity: usize,
    /// How long terminal jobs stay queryable.
    pub retention: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for QueueSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs,
            job_timeout: config.job_timeout(),
            retry_limit: config.retry_limit,
            retry_policy: RetryPolicy::from(&config.retry),
            log_capacity: config.log_capacity,
            retention: config.retention(),
        }
    }
}

impl QueueSettings {
    /// Settings with the three core capacity parameters and defaults for the rest.
    #[must_use]
    pub fn new(max_concurrent_jobs: usize, job_timeout: Duration, retry_limit: u32) -> Self {
        Self {
            max_concurrent_jobs,
            job_timeout,
            retry_limit,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[must_use]
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Checks the settings can be applied.
    pub fn validate(&self) -> JobResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(JobError::Configuration(
                "max_concurrent_jobs must be greater than zero".to_string(),
            ));
        }
        if self.job_timeout.is_zero() {
            return Err(JobError::InvalidTimeout);
        }
        if self.log_capacity == 0 {
            return Err(JobError::Configuration(
                "log_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub canceled: usize,
    pub total: usize,
    pub max_concurrent: usize,
    pub timeout_secs: u64,
    pub retry_limit: u32,
    pub available_slots: usize,
    pub queue_full: bool,
    pub running: bool,
}

/// Outcome of one maintenance cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Jobs newly flagged as long running.
    pub long_running: usize,
    /// Reclamation pass result.
    pub reclamation: ReclamationReport,
    /// Terminal jobs evicted after their retention period.
    pub evicted: usize,
}

enum AttemptOutcome {
    Succeeded,
    Canceled,
    Failed(JobError),
}

struct QueueState {
    settings: QueueSettings,
    configured: bool,
    jobs: HashMap<JobId, Job>,
    by_owner: HashMap<String, Vec<JobId>>,
    active: HashSet<JobId>,
    next_seq: u64,
}

impl QueueState {
    fn waiting_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|job| job.status == JobStatus::Waiting)
            .count()
    }
}

pub(crate) struct QueueCore {
    dispatcher: Arc<WorkerDispatcher>,
    reclaimer: Arc<ResourceReclaimer>,
    state: Mutex<QueueState>,
    job_available: Notify,
    running: AtomicBool,
}

struct LoopControl {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Priority job queue with admission control, retries and progress tracking.
pub struct JobQueueManager {
    core: Arc<QueueCore>,
    control: tokio::sync::Mutex<Option<LoopControl>>,
}

impl JobQueueManager {
    /// Creates an unconfigured manager with no reclaimable pools.
    #[must_use]
    pub fn new(dispatcher: Arc<WorkerDispatcher>) -> Self {
        Self::with_reclaimer(dispatcher, Arc::new(ResourceReclaimer::default()))
    }

    /// Creates an unconfigured manager using the given reclaimer.
    #[must_use]
    pub fn with_reclaimer(
        dispatcher: Arc<WorkerDispatcher>,
        reclaimer: Arc<ResourceReclaimer>,
    ) -> Self {
        Self {
            core: Arc::new(QueueCore {
                dispatcher,
                reclaimer,
                state: Mutex::new(QueueState {
                    settings: QueueSettings::default(),
                    configured: false,
                    jobs: HashMap::new(),
                    by_owner: HashMap::new(),
                    active: HashSet::new(),
                    next_seq: 0,
                }),
                job_available: Notify::new(),
                running: AtomicBool::new(false),
            }),
            control: tokio::sync::Mutex::new(None),
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<WorkerDispatcher> {
        &self.core.dispatcher
    }

    #[must_use]
    pub fn reclaimer(&self) -> &Arc<ResourceReclaimer> {
        &self.core.reclaimer
    }

    /// Returns true while the scheduling loop runs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }

    /// Returns the current settings.
    #[must_use]
    pub fn settings(&self) -> QueueSettings {
        self.core.state.lock().settings.clone()
    }

    /// Applies settings and (re)starts the background loops.
    ///
    /// Jobs already queued are kept and promoted under the new settings.
    pub async fn configure(&self, settings: QueueSettings) -> JobResult<()> {
        settings.validate()?;

        let mut control = self.control.lock().await;
        if let Some(previous) = control.take() {
            info!("Restarting job queue loops with new settings");
            stop_loops(previous).await;
        }

        info!(
            max_concurrent_jobs = settings.max_concurrent_jobs,
            job_timeout_secs = settings.job_timeout.as_secs(),
            retry_limit = settings.retry_limit,
            "Job queue configured"
        );
        {
            let mut state = self.core.state.lock();
            state.settings = settings;
            state.configured = true;
        }

        let shutdown = CancellationToken::new();
        let handles = vec![
            tokio::spawn(run_scheduler(Arc::clone(&self.core), shutdown.clone())),
            tokio::spawn(run_maintenance(Arc::clone(&self.core), shutdown.clone())),
        ];
        *control = Some(LoopControl { shutdown, handles });
        self.core.running.store(true, Ordering::SeqCst);
        self.core.job_available.notify_one();

        Ok(())
    }

    /// Stops the background loops. Jobs stay in the table.
    pub async fn shutdown(&self) {
        let previous = self.control.lock().await.take();
        if let Some(previous) = previous {
            info!("Stopping job queue");
            stop_loops(previous).await;
        }
        self.core.running.store(false, Ordering::SeqCst);
    }

    /// Submits a job and returns the number of waiting jobs, this one included.
    ///
    /// `work` runs once per attempt and is called again on retry.
    pub fn submit<F, Fut>(&self, request: JobRequest, work: F) -> JobResult<usize>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult<()>> + Send + 'static,
    {
        let work: JobWork = Arc::new(move |ctx| work(ctx).boxed());
        self.submit_work(request, work)
    }

    /// Submits a job with an already boxed unit of work.
    pub fn submit_work(&self, request: JobRequest, work: JobWork) -> JobResult<usize> {
        self.core.submit(request, work)
    }

    /// Returns a snapshot of one job.
    #[must_use]
    pub fn get_status(&self, job_id: &str) -> Option<JobStatusSnapshot> {
        self.core
            .state
            .lock()
            .jobs
            .get(job_id)
            .map(|job| job.snapshot(None))
    }

    /// Returns the owner's most recent job, with its position among waiting jobs.
    #[must_use]
    pub fn get_status_by_owner(&self, owner_id: &str) -> Option<JobStatusSnapshot> {
        let state = self.core.state.lock();
        let job = state
            .by_owner
            .get(owner_id)?
            .iter()
            .rev()
            .find_map(|id| state.jobs.get(id))?;

        let position = (job.status == JobStatus::Waiting).then(|| {
            1 + state
                .jobs
                .values()
                .filter(|other| other.status == JobStatus::Waiting && other.seq < job.seq)
                .count()
        });
        Some(job.snapshot(position))
    }

    /// Lists all of an owner's jobs in submission order.
    #[must_use]
    pub fn jobs_for_owner(&self, owner_id: &str) -> Vec<JobStatusSnapshot> {
        let state = self.core.state.lock();
        state
            .by_owner
            .get(owner_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.jobs.get(id))
                    .map(|job| job.snapshot(None))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns queue statistics.
    #[must_use]
    pub fn get_queue_stats(&self) -> QueueStats {
        let state = self.core.state.lock();
        let mut stats = QueueStats {
            total: state.jobs.len(),
            max_concurrent: state.settings.max_concurrent_jobs,
            timeout_secs: state.settings.job_timeout.as_secs(),
            retry_limit: state.settings.retry_limit,
            running: self.is_running(),
            ..QueueStats::default()
        };

        for job in state.jobs.values() {
            match job.status {
                JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Canceled => stats.canceled += 1,
            }
        }

        let occupied = stats.waiting + stats.processing;
        stats.available_slots = stats.max_concurrent.saturating_sub(occupied);
        stats.queue_full = occupied >= stats.max_concurrent;
        JobMetrics::update_queue_sizes(stats.waiting, stats.processing);
        stats
    }

    /// Cancels a job on behalf of its owner.
    ///
    /// A waiting job becomes canceled at once. A processing job is flagged
    /// and its task's cancellation token triggered; it becomes canceled when
    /// the attempt stops. Returns `Ok(false)` for unknown or finished jobs.
    pub fn cancel(&self, job_id: &str, owner_id: &str) -> JobResult<bool> {
        self.core.cancel(job_id, owner_id)
    }

    /// Evicts terminal jobs older than the retention period.
    pub fn evict_expired(&self) -> usize {
        self.core.evict_expired()
    }

    /// Runs one maintenance cycle now.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        self.core.maintenance_tick().await
    }
}

impl Drop for JobQueueManager {
    fn drop(&mut self) {
        if let Some(control) = self.control.get_mut().take() {
            control.shutdown.cancel();
        }
    }
}

async fn stop_loops(control: LoopControl) {
    control.shutdown.cancel();
    for handle in control.handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Job queue loop ended abnormally");
        }
    }
}

impl QueueCore {
    fn submit(&self, request: JobRequest, work: JobWork) -> JobResult<usize> {
        let mut state = self.state.lock();
        if !state.configured {
            return Err(JobError::NotConfigured);
        }

        let active = state.active.len();
        let waiting = state.waiting_count();
        let max = state.settings.max_concurrent_jobs;
        if active + waiting >= max {
            drop(state);
            JobMetrics::job_rejected();
            warn!(
                owner_id = %request.owner_id,
                active,
                waiting,
                max,
                "Job rejected, queue is full"
            );
            return Err(JobError::QueueFull {
                active,
                waiting,
                max,
            });
        }

        let job_id = JobId::generate(&request.owner_id);
        let seq = state.next_seq;
        state.next_seq += 1;

        let owner_id = request.owner_id.clone();
        let kind = request.kind.clone();
        let priority = request.priority;
        let job = Job::new(
            job_id.clone(),
            request,
            work,
            seq,
            state.settings.retry_limit,
            state.settings.log_capacity,
        );
        state
            .by_owner
            .entry(owner_id.clone())
            .or_default()
            .push(job_id.clone());
        state.jobs.insert(job_id.clone(), job);
        drop(state);

        let waiting = waiting + 1;
        debug!(job_id = %job_id, owner_id = %owner_id, priority, waiting, "Job admitted");
        JobMetrics::job_submitted(&kind, priority);
        JobMetrics::update_queue_sizes(waiting, active);
        self.job_available.notify_one();

        Ok(waiting)
    }

    /// Promotes ready jobs while capacity allows. Returns the earliest
    /// backoff deadline among the jobs left waiting.
    fn promote_ready(self: &Arc<Self>) -> Option<Instant> {
        let mut state = self.state.lock();
        if !state.configured {
            return None;
        }

        let now = Instant::now();
        while state.active.len() < state.settings.max_concurrent_jobs {
            let next = state
                .jobs
                .values()
                .filter(|job| job.is_ready(now))
                .min_by_key(|job| (job.priority, job.seq))
                .map(|job| job.id.clone());
            let Some(job_id) = next else {
                break;
            };
            self.promote(&mut state, &job_id);
        }

        state
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Waiting)
            .filter_map(|job| job.not_before)
            .min()
    }

    fn promote(self: &Arc<Self>, state: &mut QueueState, job_id: &JobId) {
        let QueueState {
            settings,
            jobs,
            active,
            ..
        } = state;
        let Some(job) = jobs.get_mut(job_id) else {
            return;
        };

        let wait_time = job.enqueued_at.elapsed();
        let attempt = job.begin_attempt();

        let core = Arc::downgrade(self);
        let callback_core = core.clone();
        let callback_job_id = job.id.clone();
        let options = TaskOptions::new()
            .id(format!("{}#{attempt}", job.id))
            .class(WorkloadClass::IoBound)
            .priority(i64::from(job.priority))
            .timeout(settings.job_timeout)
            .on_complete(move |task: &Task| {
                if let Some(core) = callback_core.upgrade() {
                    core.on_attempt_finished(&callback_job_id, attempt, task);
                }
            });

        let work = Arc::clone(&job.work);
        let ctx_job_id = job.id.clone();
        let owner_id = job.owner_id.clone();
        let payload_ref = job.payload_ref.clone();
        let payload = job.payload.clone();
        let submitted = self.dispatcher.submit(
            move |token| {
                let ctx = JobContext::new(
                    ctx_job_id,
                    owner_id,
                    payload_ref,
                    payload,
                    attempt,
                    token,
                    core,
                );
                async move {
                    work(ctx).await?;
                    Ok(serde_json::Value::Null)
                }
            },
            options,
        );

        match submitted {
            Ok(task) => {
                job.task = Some(task);
                active.insert(job_id.clone());
                JobMetrics::job_promoted(&job.kind, wait_time);
                debug!(job_id = %job_id, attempt, "Job promoted to dispatcher");
            }
            Err(e) => {
                error!(job_id = %job_id, attempt, error = %e, "Failed to hand job to dispatcher");
                if conclude_attempt(job, settings, AttemptOutcome::Failed(e)) {
                    self.spawn_reclaim_check();
                }
            }
        }
    }

    /// Completion callback of a dispatcher task.
    fn on_attempt_finished(self: &Arc<Self>, job_id: &JobId, attempt: u32, task: &Task) {
        let status = task.status();
        let error = task.error();

        let terminal = {
            let mut state = self.state.lock();
            let QueueState {
                settings,
                jobs,
                active,
                ..
            } = &mut *state;
            let Some(job) = jobs.get_mut(job_id) else {
                return;
            };
            if job.status != JobStatus::Processing || job.attempt != attempt {
                debug!(job_id = %job_id, attempt, "Ignoring completion of a stale attempt");
                return;
            }

            active.remove(job_id);
            job.task = None;

            let outcome = match status {
                TaskStatus::Completed => AttemptOutcome::Succeeded,
                _ if job.cancel_requested => AttemptOutcome::Canceled,
                TaskStatus::Canceled => AttemptOutcome::Canceled,
                _ => AttemptOutcome::Failed(error.unwrap_or_else(|| {
                    JobError::Internal("task ended without an error".to_string())
                })),
            };
            conclude_attempt(job, settings, outcome)
        };

        self.job_available.notify_one();
        if terminal {
            self.spawn_reclaim_check();
        }
    }

    pub(crate) fn record_progress(&self, job_id: &JobId, attempt: u32, current: u64, total: u64) {
        let mut state = self.state.lock();
        if let Some(job) = state.jobs.get_mut(job_id) {
            if job.status == JobStatus::Processing && job.attempt == attempt {
                job.record_progress(current, total);
            }
        }
    }

    pub(crate) fn append_log(&self, job_id: &JobId, attempt: u32, level: LogLevel, message: String) {
        let mut state = self.state.lock();
        if let Some(job) = state.jobs.get_mut(job_id) {
            if job.status == JobStatus::Processing && job.attempt == attempt {
                job.log(level, message);
            }
        }
    }

    fn cancel(self: &Arc<Self>, job_id: &str, owner_id: &str) -> JobResult<bool> {
        let task = {
            let mut state = self.state.lock();
            let Some(job) = state.jobs.get_mut(job_id) else {
                return Ok(false);
            };
            if job.owner_id != owner_id {
                warn!(job_id, owner_id, "Cancel rejected, job belongs to another owner");
                return Err(JobError::NotOwner {
                    job_id: job_id.to_string(),
                    owner_id: owner_id.to_string(),
                });
            }

            match job.status {
                JobStatus::Waiting => {
                    job.cancel();
                    JobMetrics::job_canceled(&job.kind);
                    None
                }
                JobStatus::Processing => {
                    job.cancel_requested = true;
                    job.log(LogLevel::Warning, "Cancellation requested");
                    job.task.clone()
                }
                _ => return Ok(false),
            }
        };

        match task {
            Some(task) => {
                task.cancel();
            }
            None => {
                self.job_available.notify_one();
                self.spawn_reclaim_check();
            }
        }
        Ok(true)
    }

    fn evict_expired(&self) -> usize {
        let mut state = self.state.lock();
        let retention = state.settings.retention;
        let now = Instant::now();

        let expired: Vec<JobId> = state
            .jobs
            .values()
            .filter(|job| {
                job.status.is_terminal()
                    && job
                        .finished_at
                        .is_some_and(|at| now.saturating_duration_since(at) >= retention)
            })
            .map(|job| job.id.clone())
            .collect();

        let QueueState { jobs, by_owner, .. } = &mut *state;
        for job_id in &expired {
            let Some(job) = jobs.remove(job_id) else {
                continue;
            };
            let emptied = by_owner.get_mut(&job.owner_id).is_some_and(|ids| {
                ids.retain(|id| id != job_id);
                ids.is_empty()
            });
            if emptied {
                by_owner.remove(&job.owner_id);
            }
        }

        if !expired.is_empty() {
            info!(evicted = expired.len(), "Evicted expired jobs");
        }
        expired.len()
    }

    async fn maintenance_tick(&self) -> MaintenanceReport {
        let threshold = self.reclaimer.settings().long_job_threshold;

        let long_running = {
            let mut state = self.state.lock();
            let mut flagged = 0;
            for job in state.jobs.values_mut() {
                let Some(started) = job.attempt_started else {
                    continue;
                };
                let elapsed = started.elapsed();
                if job.status == JobStatus::Processing
                    && !job.long_running_flagged
                    && elapsed >= threshold
                {
                    job.long_running_flagged = true;
                    job.log(
                        LogLevel::Warning,
                        format!(
                            "Running for {}s, forcing resource reclamation",
                            elapsed.as_secs()
                        ),
                    );
                    flagged += 1;
                }
            }
            flagged
        };

        let reclamation = if long_running > 0 {
            self.reclaimer.force("long_running_job").await
        } else {
            self.reclaimer.check("periodic").await
        };
        let evicted = self.evict_expired();

        {
            let state = self.state.lock();
            JobMetrics::update_queue_sizes(state.waiting_count(), state.active.len());
        }

        MaintenanceReport {
            long_running,
            reclamation,
            evicted,
        }
    }

    fn spawn_reclaim_check(&self) {
        if self.reclaimer.pool_count() == 0 {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let reclaimer = Arc::clone(&self.reclaimer);
            handle.spawn(async move {
                reclaimer.check("job_finished").await;
            });
        }
    }
}

/// Applies the outcome of an attempt. Returns true if the job became terminal.
fn conclude_attempt(job: &mut Job, settings: &QueueSettings, outcome: AttemptOutcome) -> bool {
    let duration = job
        .first_started
        .map(|at| at.elapsed())
        .unwrap_or_default();

    match outcome {
        AttemptOutcome::Succeeded => {
            job.complete();
            JobMetrics::job_completed(&job.kind, duration);
            true
        }
        AttemptOutcome::Canceled => {
            job.cancel();
            JobMetrics::job_canceled(&job.kind);
            true
        }
        AttemptOutcome::Failed(err) => {
            if err.is_timeout() {
                JobMetrics::job_timed_out(&job.kind);
            }

            job.retry_limit = settings.retry_limit;
            if err.is_retryable() && job.retry_count < settings.retry_limit {
                let delay = settings.retry_policy.delay_for_attempt(job.retry_count + 1);
                job.schedule_retry(&err, delay);
                JobMetrics::job_retried(&job.kind, job.retry_count);
                false
            } else {
                job.fail(&err);
                let error_type = if err.is_timeout() { "timeout" } else { "execution" };
                JobMetrics::job_failed(&job.kind, error_type, duration);
                true
            }
        }
    }
}

async fn run_scheduler(core: Arc<QueueCore>, shutdown: CancellationToken) {
    debug!("Job scheduling loop started");

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let next_deadline = match std::panic::catch_unwind(AssertUnwindSafe(|| core.promote_ready())) {
            Ok(deadline) => deadline,
            Err(_) => {
                error!("Job scheduling loop error, backing off");
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(SCHEDULER_IDLE_WAIT) => continue,
                }
            }
        };

        let wait = next_deadline.map_or(SCHEDULER_IDLE_WAIT, |deadline| {
            deadline
                .saturating_duration_since(Instant::now())
                .min(SCHEDULER_IDLE_WAIT)
        });

        tokio::select! {
            () = shutdown.cancelled() => break,
            () = core.job_available.notified() => {}
            () = tokio::time::sleep(wait) => {}
        }
    }

    debug!("Job scheduling loop stopped");
}

async fn run_maintenance(core: Arc<QueueCore>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(core.reclaimer.settings().interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let report = core.maintenance_tick().await;
                debug!(
                    long_running = report.long_running,
                    released = report.reclamation.released,
                    evicted = report.evicted,
                    "Maintenance cycle finished"
                );
            }
        }
    }
}
