//! Application configuration structures.

use docket_core::TelemetryConfig;
use docket_jobs::{DispatcherConfig, JobsConfig, QueueSettings, ReclamationSettings};
use serde::{Deserialize, Serialize};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Dispatcher, queue and reclamation configuration.
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl AppConfig {
    /// Returns the dispatcher configuration.
    #[must_use]
    pub fn dispatcher(&self) -> DispatcherConfig {
        self.jobs.dispatcher.clone()
    }

    /// Returns the queue settings applied by `configure`.
    #[must_use]
    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings::from(&self.jobs.queue)
    }

    /// Returns the reclaimer settings.
    #[must_use]
    pub fn reclamation_settings(&self) -> ReclamationSettings {
        ReclamationSettings::from(&self.jobs.reclamation)
    }

    /// Returns true when running in production.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "docket".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.app.name, "docket");
        assert_eq!(config.telemetry.log_level, "info");
        assert!(!config.is_production());

        let settings = config.queue_settings();
        assert_eq!(settings.max_concurrent_jobs, 10);
        assert_eq!(settings.job_timeout, Duration::from_secs(3600));
        assert_eq!(settings.retry_limit, 3);
        assert_eq!(settings.log_capacity, 50);
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "app": { "name": "docket", "version": "1.0.0", "environment": "production" },
            "jobs": { "queue": { "max_concurrent_jobs": 4 } }
        }))
        .unwrap();

        assert!(config.is_production());
        assert_eq!(config.queue_settings().max_concurrent_jobs, 4);
        assert_eq!(config.queue_settings().retry_limit, 3);
        assert!(config.dispatcher().io_workers >= 1);
        assert_eq!(
            config.reclamation_settings().interval,
            Duration::from_secs(60)
        );
    }
}
