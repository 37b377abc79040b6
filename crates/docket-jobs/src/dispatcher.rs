//! Worker dispatcher.
//!
//! Runs units of work under bounded concurrency. Each [`WorkloadClass`] has
//! its own priority queue; the I/O and CPU pools are each bounded by a
//! semaphore. A single scheduling loop scans the class queues in
//! [`WorkloadClass::SCAN_ORDER`] and pops an entry only once its pool has a
//! free permit, so the lowest priority value always wins the next free slot.

use crate::config::DispatcherConfig;
use crate::error::{JobError, JobResult};
use crate::metrics::DispatcherMetrics;
use crate::task::{PoolKind, Task, TaskOptions, TaskOutput, TaskStatus, WorkloadClass};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

type TaskWork = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, JobResult<TaskOutput>> + Send>;

/// Queued entry, ordered so that the heap's maximum is the smallest
/// `(priority, seq)` pair.
struct QueuedTask {
    priority: i64,
    seq: u64,
    task: Task,
    work: TaskWork,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Per-class queue depths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepths {
    pub high_priority: usize,
    pub io_bound: usize,
    pub cpu_bound: usize,
    pub low_priority: usize,
}

/// Dispatcher statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub name: String,
    pub accepting: bool,
    pub io_workers: usize,
    pub cpu_workers: usize,
    pub io_active: usize,
    pub cpu_active: usize,
    pub queued: QueueDepths,
    pub pending: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    pub canceled: u64,
    pub total_submitted: u64,
}

struct DispatcherState {
    queues: [BinaryHeap<QueuedTask>; 4],
    tasks: HashMap<String, Task>,
    next_seq: u64,
}

/// A semaphore-bounded worker pool that can be resized while running.
///
/// Shrinking below the number of busy workers leaves a debt that is paid
/// off by forgetting permits as the busy workers finish.
struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: AtomicUsize,
    debt: AtomicUsize,
}

impl WorkerPool {
    fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size: AtomicUsize::new(size),
            debt: AtomicUsize::new(0),
        }
    }

    fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    fn active(&self) -> usize {
        (self.size() + self.debt.load(Ordering::SeqCst))
            .saturating_sub(self.semaphore.available_permits())
    }

    fn take_debt(&self, max: usize) -> usize {
        let taken = self
            .debt
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |debt| {
                Some(debt - debt.min(max))
            })
            .unwrap_or(0);
        taken.min(max)
    }

    fn resize(&self, size: usize) {
        let old = self.size.swap(size, Ordering::SeqCst);
        if size > old {
            let grow = size - old;
            let repaid = self.take_debt(grow);
            self.semaphore.add_permits(grow - repaid);
        } else if size < old {
            let shrink = old - size;
            let forgotten = self.semaphore.forget_permits(shrink);
            self.debt.fetch_add(shrink - forgotten, Ordering::SeqCst);
        }
    }

    /// Returns a worker slot, or retires it while the pool is over size.
    fn release(&self, permit: OwnedSemaphorePermit) {
        if self.take_debt(1) == 1 {
            permit.forget();
        }
    }
}

pub(crate) struct DispatcherShared {
    config: DispatcherConfig,
    state: Mutex<DispatcherState>,
    io_pool: WorkerPool,
    cpu_pool: WorkerPool,
    resize_lock: Mutex<()>,
    task_available: Notify,
    accepting: AtomicBool,
    task_counter: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    canceled: AtomicU64,
}

struct LoopControl {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

enum Outcome {
    Finished(Result<JobResult<TaskOutput>, Box<dyn Any + Send>>),
    TimedOut(Duration),
}

/// Bounded two-pool task dispatcher.
pub struct WorkerDispatcher {
    shared: Arc<DispatcherShared>,
    control: Mutex<Option<LoopControl>>,
}

impl WorkerDispatcher {
    /// Creates a dispatcher. Call [`start`](Self::start) before submitting.
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        let io_workers = config.io_workers.max(1);
        let cpu_workers = config.cpu_workers.max(1);

        Self {
            shared: Arc::new(DispatcherShared {
                io_pool: WorkerPool::new(io_workers),
                cpu_pool: WorkerPool::new(cpu_workers),
                resize_lock: Mutex::new(()),
                config: DispatcherConfig {
                    io_workers,
                    cpu_workers,
                    ..config
                },
                state: Mutex::new(DispatcherState {
                    queues: Default::default(),
                    tasks: HashMap::new(),
                    next_seq: 0,
                }),
                task_available: Notify::new(),
                accepting: AtomicBool::new(false),
                task_counter: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                canceled: AtomicU64::new(0),
            }),
            control: Mutex::new(None),
        }
    }

    /// Starts the scheduling loop on the current tokio runtime.
    pub fn start(&self) -> JobResult<()> {
        let mut control = self.control.lock();
        if control.is_some() {
            return Err(JobError::Internal("Dispatcher already running".to_string()));
        }

        let config = &self.shared.config;
        info!(
            dispatcher = %config.name,
            io_workers = self.shared.pool_size(PoolKind::Io),
            cpu_workers = self.shared.pool_size(PoolKind::Cpu),
            "Starting worker dispatcher"
        );
        for kind in [PoolKind::Io, PoolKind::Cpu] {
            DispatcherMetrics::update_pool(&config.name, kind, 0, self.shared.pool_size(kind));
        }

        self.shared.accepting.store(true, Ordering::SeqCst);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_loop(Arc::clone(&self.shared), shutdown.clone()));
        *control = Some(LoopControl { shutdown, handle });

        Ok(())
    }

    /// Returns true while the dispatcher accepts work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Returns the configuration the dispatcher was built with.
    ///
    /// Pool sizes changed by [`reconfigure`](Self::reconfigure) are reported
    /// by [`stats`](Self::stats).
    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// Submits a unit of work.
    ///
    /// The closure receives the task's cancellation token, which is
    /// triggered on `cancel()` and when the timeout elapses. Returns
    /// immediately with a pending task.
    pub fn submit<F, Fut>(&self, work: F, options: TaskOptions) -> JobResult<Task>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = JobResult<TaskOutput>> + Send + 'static,
    {
        if !self.is_running() {
            return Err(JobError::DispatcherStopped);
        }
        if options.timeout == Some(Duration::ZERO) {
            return Err(JobError::InvalidTimeout);
        }

        let n = self.shared.task_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = options.id.clone().unwrap_or_else(|| format!("task_{n}"));
        let class = options.class;
        let priority = options.priority;
        // Called inside the future so a panicking closure is caught like the work itself.
        let work: TaskWork = Box::new(move |token| async move { work(token).await }.boxed());

        let task = {
            let mut state = self.shared.state.lock();
            if state.tasks.contains_key(&id) {
                return Err(JobError::DuplicateTask(id));
            }

            let task = Task::new(id.clone(), options, Arc::downgrade(&self.shared));
            let seq = state.next_seq;
            state.next_seq += 1;
            state.tasks.insert(id, task.clone());
            state.queues[class.index()].push(QueuedTask {
                priority,
                seq,
                task: task.clone(),
                work,
            });
            task
        };

        debug!(task_id = %task.id(), class = %class, priority, "Task submitted");
        DispatcherMetrics::task_submitted(&self.shared.config.name, class);
        self.shared.task_available.notify_one();

        Ok(task)
    }

    /// Looks up a task that has not reached a terminal state yet.
    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.shared.state.lock().tasks.get(task_id).cloned()
    }

    /// Number of busy I/O workers.
    #[must_use]
    pub fn io_active(&self) -> usize {
        self.shared.active(PoolKind::Io)
    }

    /// Number of busy CPU workers.
    #[must_use]
    pub fn cpu_active(&self) -> usize {
        self.shared.active(PoolKind::Cpu)
    }

    /// Number of tasks that completed successfully.
    #[must_use]
    pub fn completed_count(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Returns dispatcher statistics.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        let shared = &self.shared;
        let (queued, running) = {
            let state = shared.state.lock();
            let queued = QueueDepths {
                high_priority: state.queues[WorkloadClass::HighPriority.index()].len(),
                io_bound: state.queues[WorkloadClass::IoBound.index()].len(),
                cpu_bound: state.queues[WorkloadClass::CpuBound.index()].len(),
                low_priority: state.queues[WorkloadClass::LowPriority.index()].len(),
            };
            let running = state
                .tasks
                .values()
                .filter(|t| t.status() == TaskStatus::Running)
                .count();
            (queued, running)
        };

        DispatcherStats {
            name: shared.config.name.clone(),
            accepting: self.is_running(),
            io_workers: shared.pool_size(PoolKind::Io),
            cpu_workers: shared.pool_size(PoolKind::Cpu),
            io_active: shared.active(PoolKind::Io),
            cpu_active: shared.active(PoolKind::Cpu),
            pending: queued.high_priority + queued.io_bound + queued.cpu_bound + queued.low_priority,
            queued,
            running,
            completed: shared.completed.load(Ordering::Relaxed),
            failed: shared.failed.load(Ordering::Relaxed),
            canceled: shared.canceled.load(Ordering::Relaxed),
            total_submitted: shared.task_counter.load(Ordering::Relaxed),
        }
    }

    /// Resizes the I/O and CPU pools while running.
    ///
    /// Sizes below 1 are raised to 1. Growing takes effect immediately;
    /// shrinking retires busy workers as they finish, never interrupting them.
    pub fn reconfigure(&self, io_workers: usize, cpu_workers: usize) {
        let shared = &self.shared;
        {
            let _guard = shared.resize_lock.lock();
            shared.io_pool.resize(io_workers.max(1));
            shared.cpu_pool.resize(cpu_workers.max(1));
        }

        info!(
            dispatcher = %shared.config.name,
            io_workers = shared.pool_size(PoolKind::Io),
            cpu_workers = shared.pool_size(PoolKind::Cpu),
            "Worker pools resized"
        );
        for kind in [PoolKind::Io, PoolKind::Cpu] {
            DispatcherMetrics::update_pool(
                &shared.config.name,
                kind,
                shared.active(kind),
                shared.pool_size(kind),
            );
        }
        shared.task_available.notify_one();
    }

    /// Stops the dispatcher.
    ///
    /// Pending tasks are canceled, running tasks get their cancellation token
    /// triggered, then this waits up to the shutdown timeout for the pools
    /// to drain.
    pub async fn shutdown(&self) {
        let name = self.shared.config.name.clone();
        info!(dispatcher = %name, "Shutting down worker dispatcher");
        self.shared.accepting.store(false, Ordering::SeqCst);

        let control = self.control.lock().take();
        if let Some(control) = control {
            control.shutdown.cancel();
            if let Err(e) = control.handle.await {
                error!(dispatcher = %name, error = %e, "Dispatcher loop ended abnormally");
            }
        }

        let drained: Vec<QueuedTask> = {
            let mut state = self.shared.state.lock();
            state.queues.iter_mut().flat_map(|queue| queue.drain()).collect()
        };
        let pending = drained.len();
        for entry in drained {
            entry.task.cancel();
        }

        let running: Vec<Task> = self.shared.state.lock().tasks.values().cloned().collect();
        for task in &running {
            task.cancel();
        }

        debug!(
            dispatcher = %name,
            pending,
            running = running.len(),
            "Waiting for running tasks to finish"
        );

        let drain = async {
            while self.shared.active(PoolKind::Io) + self.shared.active(PoolKind::Cpu) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(self.shared.config.shutdown_timeout(), drain)
            .await
            .is_err()
        {
            warn!(dispatcher = %name, "Shutdown timeout reached with tasks still running");
        }

        info!(dispatcher = %name, "Worker dispatcher stopped");
    }
}

impl Drop for WorkerDispatcher {
    fn drop(&mut self) {
        if let Some(control) = self.control.get_mut().take() {
            control.shutdown.cancel();
        }
    }
}

impl DispatcherShared {
    fn pool(&self, kind: PoolKind) -> &WorkerPool {
        match kind {
            PoolKind::Io => &self.io_pool,
            PoolKind::Cpu => &self.cpu_pool,
        }
    }

    fn pool_size(&self, kind: PoolKind) -> usize {
        self.pool(kind).size()
    }

    fn active(&self, kind: PoolKind) -> usize {
        self.pool(kind).active()
    }

    /// Pops the next task whose pool has a free slot, scanning classes in order.
    fn next_ready(&self) -> Option<(QueuedTask, OwnedSemaphorePermit)> {
        let mut state = self.state.lock();
        for class in WorkloadClass::SCAN_ORDER {
            let queue = &mut state.queues[class.index()];
            if queue.is_empty() {
                continue;
            }
            let Ok(permit) = Arc::clone(&self.pool(class.pool()).semaphore).try_acquire_owned() else {
                continue;
            };
            if let Some(entry) = queue.pop() {
                return Some((entry, permit));
            }
        }
        None
    }

    fn dispatch_ready(self: &Arc<Self>) -> usize {
        let mut dispatched = 0;
        while let Some((entry, permit)) = self.next_ready() {
            dispatched += 1;
            let span = info_span!(
                "task",
                task_id = %entry.task.id(),
                class = %entry.task.class(),
            );
            tokio::spawn(Arc::clone(self).execute(entry, permit).instrument(span));
        }
        dispatched
    }

    async fn execute(self: Arc<Self>, entry: QueuedTask, permit: OwnedSemaphorePermit) {
        let QueuedTask { task, work, .. } = entry;
        let pool = task.class().pool();

        if !task.mark_running() {
            debug!("Task settled before it started");
            self.pool(pool).release(permit);
            self.task_available.notify_one();
            return;
        }
        DispatcherMetrics::update_pool(
            &self.config.name,
            pool,
            self.active(pool),
            self.pool_size(pool),
        );
        debug!(priority = task.priority(), "Task started");

        let execution = AssertUnwindSafe(work(task.cancellation_token())).catch_unwind();
        tokio::pin!(execution);

        let outcome = match task.timeout() {
            Some(limit) => tokio::select! {
                result = &mut execution => Outcome::Finished(result),
                () = tokio::time::sleep(limit) => Outcome::TimedOut(limit),
            },
            None => Outcome::Finished((&mut execution).await),
        };

        match outcome {
            Outcome::Finished(result) => record_outcome(&task, result),
            Outcome::TimedOut(limit) => {
                warn!(
                    timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    "Task timed out, cancellation requested"
                );
                task.settle(TaskStatus::Failed, None, Some(JobError::Timeout(limit)));
                // The slot stays taken until the work notices the token.
                let _ = execution.await;
                debug!("Timed-out task returned");
            }
        }

        self.pool(pool).release(permit);
        DispatcherMetrics::update_pool(
            &self.config.name,
            pool,
            self.active(pool),
            self.pool_size(pool),
        );
        self.task_available.notify_one();
    }

    /// Bookkeeping after a task's terminal transition.
    pub(crate) fn task_settled(&self, task: &Task, previous: TaskStatus, status: TaskStatus) {
        {
            let mut state = self.state.lock();
            if state.tasks.get(task.id()).is_some_and(|t| t.ptr_eq(task)) {
                state.tasks.remove(task.id());
            }
            if previous == TaskStatus::Pending {
                state.queues[task.class().index()].retain(|entry| !entry.task.ptr_eq(task));
            }
        }

        let counter = match status {
            TaskStatus::Completed => &self.completed,
            TaskStatus::Canceled => &self.canceled,
            _ => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        DispatcherMetrics::task_finished(&self.config.name, task.class(), status);

        debug!(task_id = %task.id(), status = %status, "Task finished");
    }
}

fn record_outcome(task: &Task, result: Result<JobResult<TaskOutput>, Box<dyn Any + Send>>) {
    match result {
        Ok(Ok(value)) => {
            task.settle(TaskStatus::Completed, Some(value), None);
        }
        Ok(Err(JobError::Cancelled)) if task.should_cancel() => {
            debug!("Task stopped after cancellation");
            task.settle(TaskStatus::Canceled, None, None);
        }
        Ok(Err(err)) => {
            warn!(error = %err, "Task failed");
            task.settle(TaskStatus::Failed, None, Some(err));
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(panic = %message, "Task panicked");
            task.settle(
                TaskStatus::Failed,
                None,
                Some(JobError::failed(format!("unit of work panicked: {message}"))),
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn run_loop(shared: Arc<DispatcherShared>, shutdown: CancellationToken) {
    debug!(dispatcher = %shared.config.name, "Dispatcher loop started");

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let dispatched = match std::panic::catch_unwind(AssertUnwindSafe(|| shared.dispatch_ready())) {
            Ok(n) => n,
            Err(panic) => {
                error!(
                    dispatcher = %shared.config.name,
                    panic = %panic_message(panic.as_ref()),
                    "Dispatcher loop error, backing off"
                );
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(Duration::from_secs(1)) => continue,
                }
            }
        };

        if dispatched == 0 {
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = shared.task_available.notified() => {}
                () = tokio::time::sleep(shared.config.idle_interval()) => {}
            }
        }
    }

    debug!(dispatcher = %shared.config.name, "Dispatcher loop stopped");
}
