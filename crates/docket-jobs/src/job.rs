//! Job records and status snapshots.

use crate::context::JobContext;
use crate::error::{JobError, JobResult};
use crate::task::Task;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Unit of work run for each attempt of a job.
pub type JobWork = Arc<dyn Fn(JobContext) -> BoxFuture<'static, JobResult<()>> + Send + Sync>;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Generates `job_<unix-seconds>_<owner>_<8 hex chars>`.
    pub fn generate(owner_id: &str) -> Self {
        let owner: String = owner_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "job_{}_{}_{}",
            Utc::now().timestamp(),
            owner,
            &suffix[..8]
        ))
    }

    /// Creates a job ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Job subtype. Informational only, it never affects scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    #[default]
    PptTranslate,
    PdfAnnotate,
    Other(String),
}

impl JobKind {
    /// Returns the kind as a metric label.
    #[must_use]
    pub fn as_label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::PptTranslate => write!(f, "ppt_translate"),
            JobKind::PdfAnnotate => write!(f, "pdf_annotate"),
            JobKind::Other(kind) => write!(f, "{kind}"),
        }
    }
}

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Admitted, waiting for a slot.
    #[default]
    Waiting,
    /// Handed to the dispatcher.
    Processing,
    /// Finished successfully.
    Completed,
    /// Failed after exhausting retries.
    Failed,
    /// Canceled by its owner.
    Canceled,
}

impl JobStatus {
    /// Returns true for completed, failed and canceled.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Waiting => write!(f, "waiting"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// Severity of a log trail entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One entry of a job's log trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Submission request.
///
/// # Example
///
/// ```rust,ignore
/// let request = JobRequest::new("42", "alice", "/uploads/deck.pptx")
///     .kind(JobKind::PptTranslate)
///     .priority(1)
///     .payload(serde_json::json!({"target_language": "en"}));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequest {
    pub owner_id: String,
    pub owner_label: String,
    pub payload_ref: String,
    pub kind: JobKind,
    pub priority: i32,
    pub payload: serde_json::Value,
}

impl JobRequest {
    /// Creates a request with priority 0 and an empty payload.
    pub fn new(
        owner_id: impl Into<String>,
        owner_label: impl Into<String>,
        payload_ref: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            owner_label: owner_label.into(),
            payload_ref: payload_ref.into(),
            ..Self::default()
        }
    }

    /// Sets the job kind.
    #[must_use]
    pub fn kind(mut self, kind: JobKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the priority (lower runs first).
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the payload parameters handed to every attempt.
    #[must_use]
    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Status snapshot returned by queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    pub job_id: JobId,
    pub owner_id: String,
    pub owner_label: String,
    pub label: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    pub current: u64,
    pub total: u64,
    pub error: Option<String>,
    pub priority: i32,
    pub retry_count: u32,
    pub retry_limit: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// 1-based position among waiting jobs, only filled by owner queries.
    pub queue_position: Option<usize>,
    pub logs: Vec<LogEntry>,
}

/// Job record owned by the queue manager.
pub(crate) struct Job {
    pub(crate) id: JobId,
    pub(crate) owner_id: String,
    pub(crate) owner_label: String,
    pub(crate) payload_ref: String,
    pub(crate) label: String,
    pub(crate) kind: JobKind,
    pub(crate) priority: i32,
    pub(crate) payload: Option<Arc<serde_json::Value>>,
    pub(crate) work: JobWork,

    pub(crate) status: JobStatus,
    pub(crate) progress: u8,
    pub(crate) current: u64,
    pub(crate) total: u64,
    pub(crate) error: Option<String>,
    pub(crate) retry_count: u32,
    pub(crate) retry_limit: u32,

    pub(crate) created_at: DateTime<Utc>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    logs: VecDeque<LogEntry>,
    log_capacity: usize,

    /// Arrival order, kept across retries.
    pub(crate) seq: u64,
    /// Current attempt number, 0 until the first promotion.
    pub(crate) attempt: u32,
    pub(crate) not_before: Option<Instant>,
    pub(crate) enqueued_at: Instant,
    pub(crate) first_started: Option<Instant>,
    pub(crate) attempt_started: Option<Instant>,
    pub(crate) finished_at: Option<Instant>,
    pub(crate) cancel_requested: bool,
    pub(crate) long_running_flagged: bool,
    pub(crate) task: Option<Task>,
    last_logged_decile: u8,
}

impl Job {
    pub(crate) fn new(
        id: JobId,
        request: JobRequest,
        work: JobWork,
        seq: u64,
        retry_limit: u32,
        log_capacity: usize,
    ) -> Self {
        let label = Path::new(&request.payload_ref)
            .file_name()
            .map_or_else(|| request.payload_ref.clone(), |n| n.to_string_lossy().into_owned());
        let payload = if request.payload.is_null() {
            None
        } else {
            Some(Arc::new(request.payload))
        };

        let mut job = Self {
            id,
            owner_id: request.owner_id,
            owner_label: request.owner_label,
            payload_ref: request.payload_ref,
            label,
            kind: request.kind,
            priority: request.priority,
            payload,
            work,
            status: JobStatus::Waiting,
            progress: 0,
            current: 0,
            total: 0,
            error: None,
            retry_count: 0,
            retry_limit,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            logs: VecDeque::new(),
            log_capacity: log_capacity.max(1),
            seq,
            attempt: 0,
            not_before: None,
            enqueued_at: Instant::now(),
            first_started: None,
            attempt_started: None,
            finished_at: None,
            cancel_requested: false,
            long_running_flagged: false,
            task: None,
            last_logged_decile: 0,
        };
        job.log(LogLevel::Info, format!("Job queued: {}", job.label));
        job
    }

    /// Appends to the log trail, evicting the oldest entry when full.
    pub(crate) fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(job_id = %self.id, "{message}"),
            LogLevel::Warning => tracing::warn!(job_id = %self.id, "{message}"),
            LogLevel::Error => tracing::error!(job_id = %self.id, "{message}"),
        }

        if self.logs.len() >= self.log_capacity {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            timestamp: Utc::now(),
            level,
            message,
        });
    }

    pub(crate) fn logs(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter()
    }

    /// Eligible for promotion at `now`.
    pub(crate) fn is_ready(&self, now: Instant) -> bool {
        self.status == JobStatus::Waiting && self.not_before.map_or(true, |t| t <= now)
    }

    /// Waiting to processing. Starts a new attempt and returns its number.
    pub(crate) fn begin_attempt(&mut self) -> u32 {
        let now = Instant::now();
        self.status = JobStatus::Processing;
        self.attempt += 1;
        self.not_before = None;
        self.progress = 0;
        self.current = 0;
        self.total = 0;
        self.last_logged_decile = 0;
        self.long_running_flagged = false;
        self.attempt_started = Some(now);
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
            self.first_started = Some(now);
        }
        self.log(
            LogLevel::Info,
            format!("Processing started (attempt {})", self.attempt),
        );
        self.attempt
    }

    /// Applies a progress report. Progress never decreases within an attempt.
    pub(crate) fn record_progress(&mut self, current: u64, total: u64) {
        self.current = current;
        self.total = total;

        let percent = if total == 0 {
            0
        } else {
            let ratio = u128::from(current) * 100 / u128::from(total);
            u8::try_from(ratio.min(100)).unwrap_or(100)
        };
        self.progress = self.progress.max(percent);

        let decile = self.progress / 10;
        if decile > self.last_logged_decile {
            self.last_logged_decile = decile;
            let message = format!("Progress {}% ({current}/{total})", self.progress);
            self.log(LogLevel::Info, message);
        }
    }

    pub(crate) fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.finish();
        self.log(LogLevel::Info, "Job completed");
    }

    pub(crate) fn fail(&mut self, error: &JobError) {
        self.status = JobStatus::Failed;
        self.error = Some(error.to_string());
        self.finish();
        self.log(LogLevel::Error, format!("Job failed: {error}"));
    }

    pub(crate) fn cancel(&mut self) {
        self.status = JobStatus::Canceled;
        self.finish();
        self.log(LogLevel::Warning, "Job canceled");
    }

    /// Processing back to waiting after a failed attempt.
    pub(crate) fn schedule_retry(&mut self, error: &JobError, delay: Duration) {
        let now = Instant::now();
        self.retry_count += 1;
        self.status = JobStatus::Waiting;
        self.progress = 0;
        self.current = 0;
        self.total = 0;
        self.error = Some(error.to_string());
        self.task = None;
        self.attempt_started = None;
        self.enqueued_at = now;
        self.not_before = if delay.is_zero() { None } else { Some(now + delay) };
        self.log(
            LogLevel::Warning,
            format!(
                "Attempt {} failed: {error}. Retrying ({}/{}) in {}ms",
                self.attempt,
                self.retry_count,
                self.retry_limit,
                delay.as_millis()
            ),
        );
    }

    fn finish(&mut self) {
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
            self.finished_at = Some(Instant::now());
        }
        self.release_resources();
    }

    /// Drops payload and task references so they can be freed.
    pub(crate) fn release_resources(&mut self) {
        self.payload = None;
        self.task = None;
        self.not_before = None;
    }

    pub(crate) fn snapshot(&self, queue_position: Option<usize>) -> JobStatusSnapshot {
        JobStatusSnapshot {
            job_id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            owner_label: self.owner_label.clone(),
            label: self.label.clone(),
            kind: self.kind.clone(),
            status: self.status,
            progress: self.progress,
            current: self.current,
            total: self.total,
            error: self.error.clone(),
            priority: self.priority,
            retry_count: self.retry_count,
            retry_limit: self.retry_limit,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            queue_position,
            logs: self.logs().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_work() -> JobWork {
        Arc::new(|_ctx| Box::pin(async { Ok(()) }))
    }

    fn job(log_capacity: usize) -> Job {
        let request = JobRequest::new("42", "alice", "/uploads/q3-report.pptx")
            .kind(JobKind::PptTranslate)
            .payload(serde_json::json!({"target": "en"}));
        Job::new(JobId::generate("42"), request, noop_work(), 0, 3, log_capacity)
    }

    #[test]
    fn test_job_id_format() {
        let id = JobId::generate("user 42");
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts[0], "job");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2], "user-42");
        assert_eq!(parts[3].len(), 8);
        assert_ne!(JobId::generate("42"), JobId::generate("42"));
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(JobStatus::Waiting.to_string(), "waiting");
        assert_eq!(JobStatus::Canceled.to_string(), "canceled");
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_job_kind_serde() {
        let json = serde_json::to_string(&JobKind::PdfAnnotate).unwrap();
        assert_eq!(json, "\"pdf_annotate\"");
        assert_eq!(JobKind::Other("ocr".into()).as_label(), "ocr");
        assert_eq!(JobKind::default(), JobKind::PptTranslate);
    }

    #[test]
    fn test_new_job_label_and_log() {
        let job = job(50);
        assert_eq!(job.label, "q3-report.pptx");
        assert_eq!(job.status, JobStatus::Waiting);
        assert!(job.payload.is_some());
        assert_eq!(job.logs().count(), 1);
    }

    #[test]
    fn test_log_trail_is_bounded() {
        let mut job = job(3);
        for i in 0..5 {
            job.log(LogLevel::Info, format!("entry {i}"));
        }
        let messages: Vec<&str> = job.logs().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn test_progress_is_monotonic_within_attempt() {
        let mut job = job(50);
        job.begin_attempt();

        job.record_progress(5, 10);
        assert_eq!(job.progress, 50);
        job.record_progress(3, 10);
        assert_eq!(job.progress, 50);
        assert_eq!(job.current, 3);
        job.record_progress(12, 10);
        assert_eq!(job.progress, 100);
        job.record_progress(1, 0);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_progress_logs_every_ten_percent() {
        let mut job = job(100);
        job.begin_attempt();
        let before = job.logs().count();
        for i in 1..=100 {
            job.record_progress(i, 100);
        }
        assert_eq!(job.logs().count() - before, 10);
    }

    #[test]
    fn test_retry_resets_progress_and_keeps_start() {
        let mut job = job(50);
        assert_eq!(job.begin_attempt(), 1);
        let started = job.started_at;
        job.record_progress(7, 10);

        job.schedule_retry(&JobError::failed("api down"), Duration::from_millis(100));
        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.progress, 0);
        assert_eq!(job.retry_count, 1);
        assert!(!job.is_ready(Instant::now()));

        assert_eq!(job.begin_attempt(), 2);
        assert_eq!(job.started_at, started);
    }

    #[test]
    fn test_terminal_transition_releases_payload() {
        let mut job = job(50);
        job.begin_attempt();
        job.fail(&JobError::Timeout(Duration::from_secs(1)));

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.payload.is_none());
        assert!(job.completed_at.is_some());
        assert!(job.error.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn test_snapshot() {
        let mut job = job(50);
        job.begin_attempt();
        job.record_progress(2, 8);
        let snapshot = job.snapshot(None);
        assert_eq!(snapshot.progress, 25);
        assert_eq!(snapshot.total, 8);
        assert_eq!(snapshot.status, JobStatus::Processing);
        assert_eq!(snapshot.retry_limit, 3);
        assert!(snapshot.started_at.is_some());
        assert_eq!(snapshot.logs.len(), job.logs().count());
    }
}
