//! Dispatcher task handles.
//!
//! A [`Task`] is the execution handle for one unit of work submitted to the
//! [`WorkerDispatcher`](crate::WorkerDispatcher). It reaches a terminal state
//! exactly once; callbacks registered on it run exactly once, after that
//! transition and outside every lock.

use crate::dispatcher::DispatcherShared;
use crate::error::JobError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Value produced by a successful unit of work.
pub type TaskOutput = serde_json::Value;

/// Callback invoked once a task reaches a terminal state.
pub type TaskCallback = Box<dyn FnOnce(&Task) + Send + 'static>;

/// Workload class, deciding which pool runs a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadClass {
    /// Served first, from the I/O pool.
    HighPriority,
    /// I/O-bound work.
    #[default]
    IoBound,
    /// CPU-bound work.
    CpuBound,
    /// Served last, from the CPU pool.
    LowPriority,
}

impl WorkloadClass {
    /// Order in which the scheduling loop scans the class queues.
    pub const SCAN_ORDER: [WorkloadClass; 4] = [
        WorkloadClass::HighPriority,
        WorkloadClass::IoBound,
        WorkloadClass::CpuBound,
        WorkloadClass::LowPriority,
    ];

    /// Returns the pool serving this class.
    #[must_use]
    pub const fn pool(self) -> PoolKind {
        match self {
            Self::HighPriority | Self::IoBound => PoolKind::Io,
            Self::CpuBound | Self::LowPriority => PoolKind::Cpu,
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::HighPriority => 0,
            Self::IoBound => 1,
            Self::CpuBound => 2,
            Self::LowPriority => 3,
        }
    }

    /// Returns the class name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HighPriority => "high_priority",
            Self::IoBound => "io_bound",
            Self::CpuBound => "cpu_bound",
            Self::LowPriority => "low_priority",
        }
    }
}

impl fmt::Display for WorkloadClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    Io,
    Cpu,
}

impl PoolKind {
    /// Returns the pool name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    /// Returns true for completed, failed and canceled.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Returns the status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission options for a task.
///
/// # Example
///
/// ```rust,ignore
/// let options = TaskOptions::new()
///     .class(WorkloadClass::CpuBound)
///     .priority(-1)
///     .timeout(Duration::from_secs(30));
/// ```
#[derive(Default)]
pub struct TaskOptions {
    pub(crate) id: Option<String>,
    pub(crate) class: WorkloadClass,
    pub(crate) priority: i64,
    pub(crate) timeout: Option<Duration>,
    pub(crate) callbacks: Vec<TaskCallback>,
}

impl TaskOptions {
    /// Creates default options: I/O-bound, priority 0, no timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a caller-supplied task id.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the workload class.
    #[must_use]
    pub fn class(mut self, class: WorkloadClass) -> Self {
        self.class = class;
        self
    }

    /// Sets the priority (lower runs first).
    #[must_use]
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the time budget of the running task.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Registers a completion callback before the task can start.
    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Task) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }
}

impl fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Serialisable snapshot of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: String,
    pub class: WorkloadClass,
    pub priority: i64,
    pub status: TaskStatus,
    pub timeout_ms: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Execution handle for a submitted unit of work.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

struct TaskInner {
    id: String,
    class: WorkloadClass,
    priority: i64,
    timeout: Option<Duration>,
    token: CancellationToken,
    state: Mutex<TaskState>,
    done: watch::Sender<TaskStatus>,
    dispatcher: Weak<DispatcherShared>,
}

struct TaskState {
    status: TaskStatus,
    result: Option<TaskOutput>,
    error: Option<JobError>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    callbacks: Vec<TaskCallback>,
}

impl Task {
    pub(crate) fn new(
        id: String,
        options: TaskOptions,
        dispatcher: Weak<DispatcherShared>,
    ) -> Self {
        let (done, _) = watch::channel(TaskStatus::Pending);
        Self {
            inner: Arc::new(TaskInner {
                id,
                class: options.class,
                priority: options.priority,
                timeout: options.timeout,
                token: CancellationToken::new(),
                state: Mutex::new(TaskState {
                    status: TaskStatus::Pending,
                    result: None,
                    error: None,
                    started_at: None,
                    ended_at: None,
                    callbacks: options.callbacks,
                }),
                done,
                dispatcher,
            }),
        }
    }

    /// Returns the task id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn class(&self) -> WorkloadClass {
        self.inner.class
    }

    #[must_use]
    pub fn priority(&self) -> i64 {
        self.inner.priority
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.inner.state.lock().status
    }

    /// Returns the recorded failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<JobError> {
        self.inner.state.lock().error.clone()
    }

    /// Returns the value produced by a completed task.
    #[must_use]
    pub fn result(&self) -> Option<TaskOutput> {
        self.inner.state.lock().result.clone()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().ended_at
    }

    /// Returns true once cancellation was requested or the task timed out.
    #[must_use]
    pub fn should_cancel(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Returns the token the unit of work polls for cooperative cancellation.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Requests cancellation.
    ///
    /// A pending task is removed from its queue and becomes canceled. A
    /// running task only has its cancellation token triggered; the unit of
    /// work decides when to stop. Returns false for terminal tasks.
    pub fn cancel(&self) -> bool {
        if self.settle_from(
            |status| status == TaskStatus::Pending,
            TaskStatus::Canceled,
            None,
            None,
        ) {
            return true;
        }

        if self.status() == TaskStatus::Running {
            self.inner.token.cancel();
            return true;
        }

        false
    }

    /// Registers a callback run once the task is terminal.
    ///
    /// If the task already finished, the callback runs immediately on the
    /// calling thread.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: FnOnce(&Task) + Send + 'static,
    {
        let callback: TaskCallback = Box::new(callback);
        let run_now = {
            let mut state = self.inner.state.lock();
            if state.status.is_terminal() {
                Some(callback)
            } else {
                state.callbacks.push(callback);
                None
            }
        };

        if let Some(callback) = run_now {
            self.run_callback(callback);
        }
    }

    /// Waits until the task is terminal and returns its final status.
    pub async fn wait(&self) -> TaskStatus {
        let mut rx = self.inner.done.subscribe();
        loop {
            let status = *rx.borrow_and_update();
            if status.is_terminal() {
                return status;
            }
            if rx.changed().await.is_err() {
                return self.status();
            }
        }
    }

    /// Returns a serialisable snapshot.
    #[must_use]
    pub fn info(&self) -> TaskInfo {
        let state = self.inner.state.lock();
        TaskInfo {
            task_id: self.inner.id.clone(),
            class: self.inner.class,
            priority: self.inner.priority,
            status: state.status,
            timeout_ms: self
                .inner
                .timeout
                .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
            started_at: state.started_at,
            ended_at: state.ended_at,
            error: state.error.as_ref().map(ToString::to_string),
        }
    }

    pub(crate) fn ptr_eq(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Pending to running. Fails if the task was settled in the meantime.
    pub(crate) fn mark_running(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.status != TaskStatus::Pending {
            return false;
        }
        state.status = TaskStatus::Running;
        state.started_at = Some(Utc::now());
        drop(state);
        self.inner.done.send_replace(TaskStatus::Running);
        true
    }

    /// Records the terminal state unless one was already recorded.
    pub(crate) fn settle(
        &self,
        status: TaskStatus,
        result: Option<TaskOutput>,
        error: Option<JobError>,
    ) -> bool {
        self.settle_from(|current| !current.is_terminal(), status, result, error)
    }

    fn settle_from(
        &self,
        allowed: impl FnOnce(TaskStatus) -> bool,
        status: TaskStatus,
        result: Option<TaskOutput>,
        error: Option<JobError>,
    ) -> bool {
        debug_assert!(status.is_terminal());

        let (previous, callbacks) = {
            let mut state = self.inner.state.lock();
            if !allowed(state.status) {
                return false;
            }
            let previous = state.status;
            state.status = status;
            state.result = result;
            state.error = error;
            state.ended_at = Some(Utc::now());
            (previous, std::mem::take(&mut state.callbacks))
        };

        self.inner.token.cancel();

        if let Some(dispatcher) = self.inner.dispatcher.upgrade() {
            dispatcher.task_settled(self, previous, status);
        }

        self.inner.done.send_replace(status);

        for callback in callbacks {
            self.run_callback(callback);
        }

        true
    }

    fn run_callback(&self, callback: TaskCallback) {
        if catch_unwind(AssertUnwindSafe(|| callback(self))).is_err() {
            error!(task_id = %self.inner.id, "Task callback panicked");
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("class", &self.inner.class)
            .field("priority", &self.inner.priority)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn detached(options: TaskOptions) -> Task {
        Task::new("task_test".to_string(), options, Weak::new())
    }

    #[test]
    fn test_class_pools() {
        assert_eq!(WorkloadClass::HighPriority.pool(), PoolKind::Io);
        assert_eq!(WorkloadClass::IoBound.pool(), PoolKind::Io);
        assert_eq!(WorkloadClass::CpuBound.pool(), PoolKind::Cpu);
        assert_eq!(WorkloadClass::LowPriority.pool(), PoolKind::Cpu);
    }

    #[test]
    fn test_scan_order_matches_index() {
        for (i, class) in WorkloadClass::SCAN_ORDER.iter().enumerate() {
            assert_eq!(class.index(), i);
        }
    }

    #[test]
    fn test_cancel_pending_task() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let task = detached(TaskOptions::new().on_complete(move |t| {
            assert_eq!(t.status(), TaskStatus::Canceled);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(task.cancel());
        assert_eq!(task.status(), TaskStatus::Canceled);
        assert!(task.should_cancel());
        assert!(task.ended_at().is_some());

        // Terminal tasks refuse a second cancel and never fire twice.
        assert!(!task.cancel());
        assert!(!task.settle(TaskStatus::Failed, None, Some(JobError::failed("late"))));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(task.status(), TaskStatus::Canceled);
    }

    #[test]
    fn test_cancel_running_task_only_signals() {
        let task = detached(TaskOptions::new());
        assert!(task.mark_running());
        assert!(task.started_at().is_some());

        assert!(task.cancel());
        assert!(task.should_cancel());
        assert_eq!(task.status(), TaskStatus::Running);
    }

    #[test]
    fn test_mark_running_after_cancel_fails() {
        let task = detached(TaskOptions::new());
        assert!(task.cancel());
        assert!(!task.mark_running());
    }

    #[test]
    fn test_callback_on_terminal_task_runs_immediately() {
        let task = detached(TaskOptions::new());
        task.mark_running();
        task.settle(TaskStatus::Completed, Some(serde_json::json!(7)), None);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        task.add_callback(move |t| {
            assert_eq!(t.result(), Some(serde_json::json!(7)));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let task = detached(TaskOptions::new().on_complete(|_| panic!("boom")));
        assert!(task.settle(TaskStatus::Failed, None, Some(JobError::failed("x"))));
        assert_eq!(task.status(), TaskStatus::Failed);
    }

    #[test]
    fn test_info_snapshot() {
        let task = detached(
            TaskOptions::new()
                .class(WorkloadClass::CpuBound)
                .priority(3)
                .timeout(Duration::from_millis(1500)),
        );
        task.settle(
            TaskStatus::Failed,
            None,
            Some(JobError::Timeout(Duration::from_millis(1500))),
        );

        let info = task.info();
        assert_eq!(info.task_id, "task_test");
        assert_eq!(info.class, WorkloadClass::CpuBound);
        assert_eq!(info.priority, 3);
        assert_eq!(info.timeout_ms, Some(1500));
        assert_eq!(info.status, TaskStatus::Failed);
        assert!(info.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_wait_resolves_on_settle() {
        let task = detached(TaskOptions::new());
        let waiter = task.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        tokio::task::yield_now().await;
        task.mark_running();
        task.settle(TaskStatus::Completed, None, None);

        assert_eq!(handle.await.unwrap(), TaskStatus::Completed);
        assert_eq!(task.wait().await, TaskStatus::Completed);
    }
}
