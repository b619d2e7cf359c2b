//! # Backoff Calculator
//!
//! Retry delays for failed jobs: `base_delay * multiplier^(attempts - 1)`,
//! capped at `max_delay`, with optional symmetric jitter. A job may also ask
//! for a specific delay (for example a dependency's retry hint); that request
//! is honored but still capped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::BackoffConfig;

/// Result of a backoff calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffResult {
    pub delay: Duration,
    pub backoff_type: BackoffType,
    pub next_retry_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffType {
    /// The job supplied its own retry delay
    Requested,
    /// Exponential backoff with optional jitter
    Exponential,
}

#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl BackoffCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Delay before the next attempt, given how many attempts have run
    pub fn calculate(&self, attempts: u32, requested: Option<Duration>) -> BackoffResult {
        let max_delay = Duration::from_millis(self.config.max_delay_ms);
        let (delay, backoff_type) = match requested {
            Some(requested) => (requested.min(max_delay), BackoffType::Requested),
            None => (self.exponential_delay(attempts), BackoffType::Exponential),
        };

        let next_retry_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        BackoffResult {
            delay,
            backoff_type,
            next_retry_at,
        }
    }

    fn exponential_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.config.base_delay_ms as f64;
        let exponential_delay = base_delay * self.config.multiplier.powi(exponent);

        let mut delay_ms = exponential_delay.min(self.config.max_delay_ms as f64) as u64;

        if self.config.jitter_enabled {
            delay_ms = self.apply_jitter(delay_ms);
        }

        Duration::from_millis(delay_ms)
    }

    fn apply_jitter(&self, delay_ms: u64) -> u64 {
        use rand::Rng;

        let jitter_range = (delay_ms as f64 * self.config.max_jitter) as u64;
        if jitter_range == 0 {
            return delay_ms;
        }

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(0..=jitter_range);

        if rng.gen_bool(0.5) {
            delay_ms.saturating_add(jitter)
        } else {
            delay_ms.saturating_sub(jitter)
        }
    }
}
