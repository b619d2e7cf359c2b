//! # Tracing Module
//!
//! Environment-aware console logging using the tracing ecosystem.
//! Logs go to stdout; set `KPI_MONITOR_LOG_FORMAT=json` for one JSON object
//! per line.
//!
//! Level resolution: `RUST_LOG` when set, otherwise derived from the
//! environment (`KPI_MONITOR_ENV` or `APP_ENV`): `production` logs at info,
//! everything else at debug.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::metrics;

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize tracing once per process
///
/// Safe to call repeatedly and tolerant of a subscriber installed by the host.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = use_json_format();
        let use_ansi = !json && IsTerminal::is_terminal(&std::io::stdout());

        let console_layer = if json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                log_level = %log_level,
                json_format = json,
                ansi_colors = use_ansi,
                "Console logging initialized"
            );
        }

        metrics::init();
    });
}

fn get_environment() -> String {
    std::env::var("KPI_MONITOR_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    if let Ok(level) = std::env::var("RUST_LOG") {
        return level.to_lowercase();
    }
    default_log_level(environment).to_string()
}

fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

fn use_json_format() -> bool {
    std::env::var("KPI_MONITOR_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log indicator pipeline operations in a uniform shape
#[macro_export]
macro_rules! log_indicator {
    // Full form with indicator_id
    ($level:ident, $operation:expr, indicator_id: $indicator_id:expr, $($key:ident: $value:expr),* $(,)?) => {{
        tracing::$level!(
            operation = %$operation,
            indicator_id = %$indicator_id,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "INDICATOR_{}", $operation
        );
    }};
    // Simple form - just operation
    ($level:ident, $operation:expr $(,)?) => {{
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "INDICATOR_{}", $operation
        );
    }};
    // Generic form with additional fields
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {{
        tracing::$level!(
            operation = %$operation,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "INDICATOR_{}", $operation
        );
    }};
}

/// Log job queue and worker operations
#[macro_export]
macro_rules! log_queue_worker {
    // Full form with job_id
    ($level:ident, $operation:expr, job_id: $job_id:expr, $($key:ident: $value:expr),* $(,)?) => {{
        tracing::$level!(
            operation = %$operation,
            job_id = %$job_id,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "QUEUE_{}", $operation
        );
    }};
    // Simple form - just operation
    ($level:ident, $operation:expr $(,)?) => {{
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "QUEUE_{}", $operation
        );
    }};
    // Generic form with additional fields
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {{
        tracing::$level!(
            operation = %$operation,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "QUEUE_{}", $operation
        );
    }};
}
