//! Configuration validation module.
//!
//! Checks every configuration value up front and reports all problems found,
//! failing fast on invalid configuration rather than at runtime.

use crate::AppConfig;
use docket_core::TelemetryConfig;
use docket_jobs::{DispatcherConfig, QueueConfig, ReclamationConfig, RetryConfig};
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// A count that must be positive is zero.
    ZeroValue { name: String },
    /// Pool size exceeds maximum allowed.
    PoolSizeTooLarge { name: String, value: usize, maximum: usize },
    /// Timeout value must be positive.
    NonPositiveTimeout { name: String, value: u64 },
    /// Jitter factor must be between 0.0 and 1.0.
    InvalidJitterFactor { value: f64 },
    /// Backoff multiplier must be at least 1.0.
    InvalidMultiplier { value: f64 },
    /// Initial retry delay is above the maximum delay.
    InvalidRetryDelays { initial_ms: u64, max_ms: u64 },
    /// Log level is invalid.
    InvalidLogLevel { value: String },
    /// Application name is empty.
    MissingAppName,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroValue { name } => write!(f, "'{}' must be greater than zero", name),
            Self::PoolSizeTooLarge {
                name,
                value,
                maximum,
            } => {
                write!(
                    f,
                    "Pool size '{}' of {} exceeds maximum allowed ({})",
                    name, value, maximum
                )
            }
            Self::NonPositiveTimeout { name, value } => {
                write!(f, "Timeout '{}' must be positive, got {}", name, value)
            }
            Self::InvalidJitterFactor { value } => {
                write!(
                    f,
                    "Invalid retry jitter factor: {} (must be between 0.0 and 1.0)",
                    value
                )
            }
            Self::InvalidMultiplier { value } => {
                write!(f, "Invalid retry multiplier: {} (must be at least 1.0)", value)
            }
            Self::InvalidRetryDelays { initial_ms, max_ms } => {
                write!(
                    f,
                    "Initial retry delay ({}ms) cannot be greater than max delay ({}ms)",
                    initial_ms, max_ms
                )
            }
            Self::InvalidLogLevel { value } => {
                write!(
                    f,
                    "Invalid log level: '{}' (valid: trace, debug, info, warn, error)",
                    value
                )
            }
            Self::MissingAppName => write!(f, "Application name must not be empty"),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of configuration validation containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ConfigValidationError>,
}

impl ValidationResult {
    fn add_error(&mut self, error: ConfigValidationError) {
        self.errors.push(error);
    }

    fn require_positive(&mut self, name: &str, value: usize) {
        if value == 0 {
            self.add_error(ConfigValidationError::ZeroValue {
                name: name.to_string(),
            });
        }
    }

    fn require_timeout(&mut self, name: &str, value: u64) {
        if value == 0 {
            self.add_error(ConfigValidationError::NonPositiveTimeout {
                name: name.to_string(),
                value,
            });
        }
    }

    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the validation errors.
    pub fn errors(&self) -> &[ConfigValidationError] {
        &self.errors
    }

    /// Converts to Result, returning Err with all errors if any exist.
    pub fn into_result(self) -> Result<(), Vec<ConfigValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Maximum size of either worker pool.
    const MAX_POOL_SIZE: usize = 1024;
    /// Valid log levels.
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];

    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut result = ValidationResult::default();

        if config.app.name.trim().is_empty() {
            result.add_error(ConfigValidationError::MissingAppName);
        }
        Self::validate_telemetry(&config.telemetry, &mut result);
        Self::validate_dispatcher(&config.jobs.dispatcher, &mut result);
        Self::validate_queue(&config.jobs.queue, &mut result);
        Self::validate_reclamation(&config.jobs.reclamation, &mut result);

        result.into_result()
    }

    fn validate_telemetry(config: &TelemetryConfig, result: &mut ValidationResult) {
        let level = config.log_level.to_lowercase();
        if !Self::VALID_LOG_LEVELS.contains(&level.as_str()) {
            result.add_error(ConfigValidationError::InvalidLogLevel {
                value: config.log_level.clone(),
            });
        }
    }

    fn validate_dispatcher(config: &DispatcherConfig, result: &mut ValidationResult) {
        for (name, value) in [
            ("io_workers", config.io_workers),
            ("cpu_workers", config.cpu_workers),
        ] {
            result.require_positive(name, value);
            if value > Self::MAX_POOL_SIZE {
                result.add_error(ConfigValidationError::PoolSizeTooLarge {
                    name: name.to_string(),
                    value,
                    maximum: Self::MAX_POOL_SIZE,
                });
            }
        }
        result.require_timeout("shutdown_timeout_secs", config.shutdown_timeout_secs);
    }

    fn validate_queue(config: &QueueConfig, result: &mut ValidationResult) {
        result.require_positive("max_concurrent_jobs", config.max_concurrent_jobs);
        result.require_positive("log_capacity", config.log_capacity);
        result.require_timeout("job_timeout_secs", config.job_timeout_secs);
        Self::validate_retry(&config.retry, result);
    }

    fn validate_retry(config: &RetryConfig, result: &mut ValidationResult) {
        if !(0.0..=1.0).contains(&config.jitter_factor) {
            result.add_error(ConfigValidationError::InvalidJitterFactor {
                value: config.jitter_factor,
            });
        }
        if config.multiplier < 1.0 {
            result.add_error(ConfigValidationError::InvalidMultiplier {
                value: config.multiplier,
            });
        }
        if config.initial_delay_ms > config.max_delay_ms {
            result.add_error(ConfigValidationError::InvalidRetryDelays {
                initial_ms: config.initial_delay_ms,
                max_ms: config.max_delay_ms,
            });
        }
    }

    fn validate_reclamation(config: &ReclamationConfig, result: &mut ValidationResult) {
        result.require_timeout("reclamation.interval_secs", config.interval_secs);
        result.require_timeout(
            "reclamation.long_job_threshold_secs",
            config.long_job_threshold_secs,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_all_errors_are_collected() {
        let mut config = AppConfig::default();
        config.jobs.queue.max_concurrent_jobs = 0;
        config.jobs.queue.job_timeout_secs = 0;
        config.jobs.dispatcher.io_workers = 0;
        config.telemetry.log_level = "verbose".to_string();

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ConfigValidationError::ZeroValue {
            name: "max_concurrent_jobs".to_string()
        }));
        assert!(errors.contains(&ConfigValidationError::NonPositiveTimeout {
            name: "job_timeout_secs".to_string(),
            value: 0
        }));
        assert!(errors.contains(&ConfigValidationError::InvalidLogLevel {
            value: "verbose".to_string()
        }));
    }

    #[test]
    fn test_retry_settings() {
        let mut config = AppConfig::default();
        config.jobs.queue.retry.jitter_factor = 1.5;
        config.jobs.queue.retry.multiplier = 0.5;
        config.jobs.queue.retry.initial_delay_ms = 10_000;
        config.jobs.queue.retry.max_delay_ms = 1_000;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_oversized_pool() {
        let mut config = AppConfig::default();
        config.jobs.dispatcher.cpu_workers = 4096;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ConfigValidationError::PoolSizeTooLarge {
                name: "cpu_workers".to_string(),
                value: 4096,
                maximum: 1024,
            }]
        );
    }

    #[test]
    fn test_uppercase_log_level_is_accepted() {
        let mut config = AppConfig::default();
        config.telemetry.log_level = "DEBUG".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
