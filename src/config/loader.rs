//! Configuration Loader
//!
//! Environment-aware loading on top of the `config` crate. Environment
//! detection reads `KPI_MONITOR_ENV`, then `APP_ENV`, defaulting to
//! `development`.

use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::KpiMonitorConfig;

/// Prefix for `KPI_MONITOR__SECTION__KEY` overrides
pub const ENV_PREFIX: &str = "KPI_MONITOR";
const ENV_SEPARATOR: &str = "__";

/// Loaded configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: KpiMonitorConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from `./config`
    pub fn load() -> ConfigResult<Self> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Self> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load with an explicit environment, useful for tests that must not touch
    /// process-wide environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Self> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading KPI monitor configuration"
        );

        let defaults = Config::try_from(&KpiMonitorConfig::default())
            .map_err(|e| ConfigurationError::load_failed(environment, e))?;

        let config: KpiMonitorConfig = Config::builder()
            .add_source(defaults)
            .add_source(File::from(config_directory.join("base.toml")).required(false))
            .add_source(
                File::from(config_directory.join(format!("{environment}.toml"))).required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .and_then(|merged| merged.try_deserialize())
            .map_err(|e| ConfigurationError::load_failed(environment, e))?;

        config.validate()?;

        debug!(
            worker_count = config.queue.worker_count,
            interval_seconds = config.scheduler.interval_seconds,
            max_attempts = config.queue.max_attempts,
            "Configuration loaded successfully"
        );

        Ok(Self {
            config,
            environment: environment.to_string(),
            config_directory,
        })
    }

    /// Wrap an already-built configuration (tests, embedding hosts)
    pub fn from_config(config: KpiMonitorConfig, environment: &str) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        })
    }

    pub fn config(&self) -> &KpiMonitorConfig {
        &self.config
    }

    pub fn into_config(self) -> KpiMonitorConfig {
        self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Current environment from `KPI_MONITOR_ENV` or `APP_ENV`
    pub fn detect_environment() -> String {
        env::var("KPI_MONITOR_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
