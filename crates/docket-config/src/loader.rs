//! Configuration loader with layered sources.

use crate::{AppConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use docket_core::{DocketError, DocketResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "DOCKET";

/// Configuration loader with runtime reload support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: PathBuf,
    environment: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `DOCKET_` prefix
    ///
    /// The environment name comes from `DOCKET_ENVIRONMENT` (default `development`).
    pub fn new(config_dir: impl Into<PathBuf>) -> DocketResult<Self> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("DOCKET_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        Self::with_environment(config_dir, environment)
    }

    /// Creates a loader for an explicit environment name.
    pub fn with_environment(
        config_dir: impl Into<PathBuf>,
        environment: impl Into<String>,
    ) -> DocketResult<Self> {
        let config_dir = config_dir.into();
        let environment = environment.into();
        let config = load_config(&config_dir, &environment, None)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
            environment,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> DocketResult<Self> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Name of the environment the configuration was loaded for.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Reloads the configuration from disk.
    ///
    /// The current configuration is kept when the new one fails to load or validate.
    pub async fn reload(&self) -> DocketResult<()> {
        let new_config = load_config(&self.config_dir, &self.environment, None)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Gets a specific configuration value by key path, such as `jobs.queue.retry_limit`.
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let config = self.config.read().await;
        let json = serde_json::to_value(&*config).ok()?;

        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }

        serde_json::from_value(current.clone()).ok()
    }
}

/// Builds and validates the configuration.
///
/// `env_vars` replaces the process environment as the override source when given.
fn load_config(
    config_dir: &Path,
    environment: &str,
    env_vars: Option<config::Map<String, String>>,
) -> DocketResult<AppConfig> {
    info!(environment, config_dir = %config_dir.display(), "Loading configuration");

    let mut builder = Config::builder();

    for name in ["default", environment, "local"] {
        let path = config_dir.join(format!("{name}.toml"));
        if path.exists() {
            debug!("Loading config from: {}", path.display());
            builder = builder.add_source(File::from(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env_vars),
    );

    let app_config: AppConfig = builder
        .build()
        .and_then(Config::try_deserialize)
        .map_err(config_error_to_docket_error)?;

    if let Err(errors) = ConfigValidator::validate(&app_config) {
        for error in &errors {
            warn!(error = %error, "Invalid configuration value");
        }
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(DocketError::configuration(messages.join("; ")));
    }

    Ok(app_config)
}

fn config_error_to_docket_error(err: ConfigError) -> DocketError {
    DocketError::Configuration(err.to_string())
}
