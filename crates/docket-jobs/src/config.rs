//! Job engine configuration.

use crate::retry::RetryStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the job engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Worker dispatcher configuration.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Job queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Resource reclamation configuration.
    #[serde(default)]
    pub reclamation: ReclamationConfig,
}

/// Worker dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Name used in logs and metric labels.
    #[serde(default = "default_dispatcher_name")]
    pub name: String,

    /// Size of the I/O-bound pool (also serves high-priority tasks).
    #[serde(default = "default_io_workers")]
    pub io_workers: usize,

    /// Size of the CPU-bound pool (also serves low-priority tasks).
    #[serde(default = "default_cpu_workers")]
    pub cpu_workers: usize,

    /// Fallback wake-up interval of the scheduling loop in milliseconds.
    #[serde(default = "default_idle_interval")]
    pub idle_interval_ms: u64,

    /// How long `shutdown` waits for running tasks, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name: default_dispatcher_name(),
            io_workers: default_io_workers(),
            cpu_workers: default_cpu_workers(),
            idle_interval_ms: default_idle_interval(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}

fn default_dispatcher_name() -> String {
    "dispatcher".to_string()
}

fn default_io_workers() -> usize {
    // Three quarters of min(32, 2 * cpus).
    let max_workers = (available_cpus() * 2).min(32);
    (max_workers * 3 / 4).max(1)
}

fn default_cpu_workers() -> usize {
    available_cpus().max(1)
}

fn default_idle_interval() -> u64 {
    100
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl DispatcherConfig {
    /// Creates a configuration with explicit pool sizes.
    #[must_use]
    pub fn with_workers(io_workers: usize, cpu_workers: usize) -> Self {
        Self {
            io_workers,
            cpu_workers,
            ..Self::default()
        }
    }

    /// Returns the idle interval as Duration.
    #[must_use]
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms.max(1))
    }

    /// Returns the shutdown timeout as Duration.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Job queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Admission ceiling: waiting plus processing jobs.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Wall-clock budget of one attempt, in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// How many times a failed job is re-admitted.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Backoff between attempts.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Log trail entries kept per job.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// How long terminal jobs stay queryable, in seconds.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_timeout_secs: default_job_timeout(),
            retry_limit: default_retry_limit(),
            retry: RetryConfig::default(),
            log_capacity: default_log_capacity(),
            retention_secs: default_retention(),
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    10
}

fn default_job_timeout() -> u64 {
    3600 // 1 hour
}

fn default_retry_limit() -> u32 {
    3
}

fn default_log_capacity() -> usize {
    50
}

fn default_retention() -> u64 {
    86400 // 24 hours
}

impl QueueConfig {
    /// Returns the job timeout as Duration.
    #[must_use]
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Returns the retention period as Duration.
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Retry backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Backoff strategy.
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Initial delay in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::default(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    300_000 // 5 minutes
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.1
}

/// Resource reclamation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclamationConfig {
    /// Interval of the maintenance cycle in seconds.
    #[serde(default = "default_reclaim_interval")]
    pub interval_secs: u64,

    /// Checked-out count above which a pool is reclaimed.
    #[serde(default = "default_checkout_threshold")]
    pub checkout_threshold: usize,

    /// Jobs processing longer than this force a reclamation pass, in seconds.
    #[serde(default = "default_long_job_threshold")]
    pub long_job_threshold_secs: u64,
}

impl Default for ReclamationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reclaim_interval(),
            checkout_threshold: default_checkout_threshold(),
            long_job_threshold_secs: default_long_job_threshold(),
        }
    }
}

fn default_reclaim_interval() -> u64 {
    60
}

fn default_checkout_threshold() -> usize {
    8
}

fn default_long_job_threshold() -> u64 {
    600 // 10 minutes
}

impl ReclamationConfig {
    /// Returns the maintenance interval as Duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Returns the long job threshold as Duration.
    #[must_use]
    pub fn long_job_threshold(&self) -> Duration {
        Duration::from_secs(self.long_job_threshold_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_sizes() {
        let config = DispatcherConfig::default();
        assert!(config.io_workers >= 1);
        assert!(config.io_workers <= 24);
        assert!(config.cpu_workers >= 1);
    }

    #[test]
    fn test_default_queue_config() {
        let config = QueueConfig::default();
        assert_eq!(config.max_concurrent_jobs, 10);
        assert_eq!(config.job_timeout(), Duration::from_secs(3600));
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.log_capacity, 50);
        assert_eq!(config.retention(), Duration::from_secs(86400));
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: JobsConfig = serde_json::from_str(
            r#"{"queue": {"max_concurrent_jobs": 2, "retry": {"strategy": "fixed"}}}"#,
        )
        .unwrap();

        assert_eq!(config.queue.max_concurrent_jobs, 2);
        assert_eq!(config.queue.retry_limit, 3);
        assert_eq!(config.queue.retry.strategy, RetryStrategy::Fixed);
        assert_eq!(config.queue.retry.initial_delay_ms, 500);
        assert_eq!(config.reclamation.interval_secs, 60);
    }

    #[test]
    fn test_idle_interval_never_zero() {
        let config = DispatcherConfig {
            idle_interval_ms: 0,
            ..DispatcherConfig::default()
        };
        assert_eq!(config.idle_interval(), Duration::from_millis(1));
    }
}
