//! # KPI Monitor Configuration
//!
//! Layered configuration: built-in defaults, then `config/base.toml`, then
//! `config/{environment}.toml`, then `KPI_MONITOR__SECTION__KEY` environment
//! variables. Every section defaults, so an empty directory yields a usable
//! configuration.
//!
//! ```rust,no_run
//! use kpi_monitor::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let workers = manager.config().queue.worker_count;
//! # let _ = workers;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::system;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiMonitorConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub queue: QueueConfig,
    pub backoff: BackoffConfig,
    pub retention: RetentionConfig,
    pub corrective_action: CorrectiveActionConfig,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Falls back to `DATABASE_URL` when empty
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            acquire_timeout_seconds: 30,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    pub fn database_url(&self) -> String {
        if !self.url.is_empty() {
            return self.url.clone();
        }
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost:5432/kpi_monitor".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Logical id of the recurring check-all registration
    pub job_id: String,
    pub interval_seconds: u64,
    /// Enqueue one cycle immediately instead of waiting a full interval
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            job_id: system::PROCESS_ALL_JOB_ID.to_string(),
            interval_seconds: system::DEFAULT_CHECK_INTERVAL_SECONDS,
            run_on_start: false,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub worker_count: usize,
    pub poll_interval_ms: u64,
    /// How long a received job stays invisible before redelivery
    pub visibility_timeout_seconds: u64,
    /// Maximum execution time of a single job
    pub job_timeout_seconds: u64,
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            poll_interval_ms: 250,
            visibility_timeout_seconds: 900,
            job_timeout_seconds: 600,
            max_attempts: 5,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_enabled: bool,
    /// Maximum jitter as a fraction of the delay (0.0 to 1.0)
    pub max_jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            multiplier: 2.0,
            jitter_enabled: true,
            max_jitter: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub completed_max_count: usize,
    pub completed_max_age_seconds: u64,
    pub failed_max_count: usize,
    pub failed_max_age_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            completed_max_count: 100,
            completed_max_age_seconds: 24 * 60 * 60,
            failed_max_count: 500,
            failed_max_age_seconds: 7 * 24 * 60 * 60,
        }
    }
}

impl RetentionConfig {
    pub fn completed_max_age(&self) -> Duration {
        Duration::from_secs(self.completed_max_age_seconds)
    }

    pub fn failed_max_age(&self) -> Duration {
        Duration::from_secs(self.failed_max_age_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectiveActionConfig {
    pub due_in_days: i64,
}

impl Default for CorrectiveActionConfig {
    fn default() -> Self {
        Self {
            due_in_days: system::DEFAULT_CORRECTIVE_DUE_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Indicators evaluated concurrently within one check-all cycle
    pub indicator_concurrency: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            indicator_concurrency: 8,
        }
    }
}

impl KpiMonitorConfig {
    /// Validate configuration for consistency
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                0,
                "pool size must be greater than 0",
            ));
        }

        if self.scheduler.interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.interval_seconds",
                0,
                "interval must be greater than 0",
            ));
        }

        if self.scheduler.job_id.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "scheduler.job_id",
                "",
                "recurring job id must not be empty",
            ));
        }

        if self.queue.worker_count == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.worker_count",
                0,
                "at least one worker is required",
            ));
        }

        if self.queue.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.max_attempts",
                0,
                "at least one attempt is required",
            ));
        }

        if self.queue.job_timeout_seconds >= self.queue.visibility_timeout_seconds {
            return Err(ConfigurationError::invalid_value(
                "queue.job_timeout_seconds",
                self.queue.job_timeout_seconds,
                format!(
                    "must be less than queue.visibility_timeout_seconds ({})",
                    self.queue.visibility_timeout_seconds
                ),
            ));
        }

        if self.backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.multiplier",
                self.backoff.multiplier,
                "multiplier must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff.max_jitter) {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_jitter",
                self.backoff.max_jitter,
                "jitter must be between 0.0 and 1.0",
            ));
        }

        if self.corrective_action.due_in_days <= 0 {
            return Err(ConfigurationError::invalid_value(
                "corrective_action.due_in_days",
                self.corrective_action.due_in_days,
                "due date must be in the future",
            ));
        }

        if self.processing.indicator_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "processing.indicator_concurrency",
                0,
                "concurrency must be greater than 0",
            ));
        }

        Ok(())
    }
}
