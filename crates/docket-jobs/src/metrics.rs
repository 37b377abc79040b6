//! Metrics for job queue and dispatcher monitoring.
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the embedding application.

use crate::job::JobKind;
use crate::task::{PoolKind, TaskStatus, WorkloadClass};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the job engine.
pub mod names {
    /// Total jobs admitted.
    pub const JOBS_SUBMITTED_TOTAL: &str = "docket_jobs_submitted_total";
    /// Total submissions rejected at admission.
    pub const JOBS_REJECTED_TOTAL: &str = "docket_jobs_rejected_total";
    /// Total attempts promoted to the dispatcher.
    pub const JOBS_PROMOTED_TOTAL: &str = "docket_jobs_promoted_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "docket_jobs_completed_total";
    /// Total jobs failed permanently.
    pub const JOBS_FAILED_TOTAL: &str = "docket_jobs_failed_total";
    /// Total jobs re-admitted after a failure.
    pub const JOBS_RETRIED_TOTAL: &str = "docket_jobs_retried_total";
    /// Total jobs canceled.
    pub const JOBS_CANCELED_TOTAL: &str = "docket_jobs_canceled_total";
    /// Total attempts that timed out.
    pub const JOBS_TIMED_OUT_TOTAL: &str = "docket_jobs_timed_out_total";

    /// Current waiting jobs.
    pub const JOBS_WAITING: &str = "docket_jobs_waiting";
    /// Current processing jobs.
    pub const JOBS_PROCESSING: &str = "docket_jobs_processing";

    /// Job duration from first promotion to terminal state, in seconds.
    pub const JOB_DURATION_SECONDS: &str = "docket_job_duration_seconds";
    /// Time between submission (or retry) and promotion, in seconds.
    pub const JOB_WAIT_TIME_SECONDS: &str = "docket_job_wait_time_seconds";

    /// Total tasks submitted to the dispatcher.
    pub const TASKS_SUBMITTED_TOTAL: &str = "docket_dispatcher_tasks_submitted_total";
    /// Total tasks reaching a terminal state.
    pub const TASKS_FINISHED_TOTAL: &str = "docket_dispatcher_tasks_finished_total";
    /// Busy workers per pool.
    pub const POOL_ACTIVE: &str = "docket_dispatcher_pool_active";
    /// Pool size.
    pub const POOL_SIZE: &str = "docket_dispatcher_pool_size";

    /// Reclamation passes run.
    pub const RECLAMATION_PASSES_TOTAL: &str = "docket_reclamation_passes_total";
    /// Resources released by reclamation.
    pub const RECLAIMED_RESOURCES_TOTAL: &str = "docket_reclaimed_resources_total";
    /// Reclamation attempts that failed.
    pub const RECLAMATION_FAILURES_TOTAL: &str = "docket_reclamation_failures_total";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_SUBMITTED_TOTAL, "Total number of jobs admitted");
    describe_counter!(
        names::JOBS_REJECTED_TOTAL,
        "Total number of submissions rejected because the queue was full"
    );
    describe_counter!(
        names::JOBS_PROMOTED_TOTAL,
        "Total number of job attempts handed to the dispatcher"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of jobs that failed after exhausting retries"
    );
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Total number of job retries");
    describe_counter!(names::JOBS_CANCELED_TOTAL, "Total number of jobs canceled");
    describe_counter!(
        names::JOBS_TIMED_OUT_TOTAL,
        "Total number of job attempts that timed out"
    );

    describe_gauge!(names::JOBS_WAITING, "Current number of waiting jobs");
    describe_gauge!(names::JOBS_PROCESSING, "Current number of processing jobs");

    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job duration from first promotion to terminal state in seconds"
    );
    describe_histogram!(
        names::JOB_WAIT_TIME_SECONDS,
        "Job wait time before promotion in seconds"
    );

    describe_counter!(
        names::TASKS_SUBMITTED_TOTAL,
        "Total number of tasks submitted to the dispatcher"
    );
    describe_counter!(
        names::TASKS_FINISHED_TOTAL,
        "Total number of dispatcher tasks reaching a terminal state"
    );
    describe_gauge!(names::POOL_ACTIVE, "Number of busy workers per pool");
    describe_gauge!(names::POOL_SIZE, "Configured size of each worker pool");

    describe_counter!(
        names::RECLAMATION_PASSES_TOTAL,
        "Total number of resource reclamation passes"
    );
    describe_counter!(
        names::RECLAIMED_RESOURCES_TOTAL,
        "Total number of resources released by reclamation"
    );
    describe_counter!(
        names::RECLAMATION_FAILURES_TOTAL,
        "Total number of failed pool reclamations"
    );
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job admitted.
    pub fn job_submitted(kind: &JobKind, priority: i32) {
        counter!(
            names::JOBS_SUBMITTED_TOTAL,
            "kind" => kind.as_label(),
            "priority" => priority.to_string()
        )
        .increment(1);
    }

    /// Record a submission rejected at admission.
    pub fn job_rejected() {
        counter!(names::JOBS_REJECTED_TOTAL).increment(1);
    }

    /// Record an attempt promoted to the dispatcher.
    pub fn job_promoted(kind: &JobKind, wait_time: Duration) {
        counter!(names::JOBS_PROMOTED_TOTAL, "kind" => kind.as_label()).increment(1);
        histogram!(names::JOB_WAIT_TIME_SECONDS, "kind" => kind.as_label())
            .record(wait_time.as_secs_f64());
    }

    /// Record a job completed.
    pub fn job_completed(kind: &JobKind, duration: Duration) {
        counter!(names::JOBS_COMPLETED_TOTAL, "kind" => kind.as_label()).increment(1);
        histogram!(
            names::JOB_DURATION_SECONDS,
            "kind" => kind.as_label(),
            "status" => "completed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a job failed permanently.
    pub fn job_failed(kind: &JobKind, error_type: &'static str, duration: Duration) {
        counter!(
            names::JOBS_FAILED_TOTAL,
            "kind" => kind.as_label(),
            "error_type" => error_type
        )
        .increment(1);
        histogram!(
            names::JOB_DURATION_SECONDS,
            "kind" => kind.as_label(),
            "status" => "failed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a job re-admitted.
    pub fn job_retried(kind: &JobKind, retry: u32) {
        counter!(
            names::JOBS_RETRIED_TOTAL,
            "kind" => kind.as_label(),
            "retry" => retry.to_string()
        )
        .increment(1);
    }

    /// Record a job canceled.
    pub fn job_canceled(kind: &JobKind) {
        counter!(names::JOBS_CANCELED_TOTAL, "kind" => kind.as_label()).increment(1);
    }

    /// Record an attempt that timed out.
    pub fn job_timed_out(kind: &JobKind) {
        counter!(names::JOBS_TIMED_OUT_TOTAL, "kind" => kind.as_label()).increment(1);
    }

    /// Update queue size gauges.
    #[allow(clippy::cast_precision_loss)]
    pub fn update_queue_sizes(waiting: usize, processing: usize) {
        gauge!(names::JOBS_WAITING).set(waiting as f64);
        gauge!(names::JOBS_PROCESSING).set(processing as f64);
    }
}

/// Dispatcher metrics recorder.
#[derive(Clone)]
pub struct DispatcherMetrics;

impl DispatcherMetrics {
    /// Record a task submitted.
    pub fn task_submitted(dispatcher: &str, class: WorkloadClass) {
        counter!(
            names::TASKS_SUBMITTED_TOTAL,
            "dispatcher" => dispatcher.to_string(),
            "class" => class.as_str()
        )
        .increment(1);
    }

    /// Record a task reaching a terminal state.
    pub fn task_finished(dispatcher: &str, class: WorkloadClass, status: TaskStatus) {
        counter!(
            names::TASKS_FINISHED_TOTAL,
            "dispatcher" => dispatcher.to_string(),
            "class" => class.as_str(),
            "status" => status.as_str()
        )
        .increment(1);
    }

    /// Update pool gauges.
    #[allow(clippy::cast_precision_loss)]
    pub fn update_pool(dispatcher: &str, pool: PoolKind, active: usize, size: usize) {
        gauge!(
            names::POOL_ACTIVE,
            "dispatcher" => dispatcher.to_string(),
            "pool" => pool.as_str()
        )
        .set(active as f64);
        gauge!(
            names::POOL_SIZE,
            "dispatcher" => dispatcher.to_string(),
            "pool" => pool.as_str()
        )
        .set(size as f64);
    }
}

/// Reclamation metrics recorder.
#[derive(Clone)]
pub struct ReclamationMetrics;

impl ReclamationMetrics {
    /// Record a reclamation pass.
    pub fn pass(reason: &str, forced: bool) {
        counter!(
            names::RECLAMATION_PASSES_TOTAL,
            "reason" => reason.to_string(),
            "forced" => forced.to_string()
        )
        .increment(1);
    }

    /// Record resources released from a pool.
    pub fn reclaimed(pool: &str, count: usize) {
        counter!(names::RECLAIMED_RESOURCES_TOTAL, "pool" => pool.to_string())
            .increment(count as u64);
    }

    /// Record a failed pool reclamation.
    pub fn failure(pool: &str) {
        counter!(names::RECLAMATION_FAILURES_TOTAL, "pool" => pool.to_string()).increment(1);
    }
}
