//! # KPI Monitor Metrics
//!
//! OpenTelemetry instruments for breach cycles and the job queue. Instruments
//! come from the global meter provider, so they are no-ops until the host
//! process installs an exporter.
//!
//! ```rust
//! use kpi_monitor::metrics;
//! use opentelemetry::KeyValue;
//!
//! metrics::breaches_detected_total().add(1, &[KeyValue::new("level", "critical")]);
//! ```

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

static KPI_MONITOR_METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    KPI_MONITOR_METER.get_or_init(|| opentelemetry::global::meter_provider().meter("kpi-monitor"))
}

/// Eagerly create the meter so the first cycle does not pay for it
pub fn init() {
    let _ = meter();
}

// Breach processing

/// Indicators evaluated (a data point was present)
pub fn evaluations_total() -> Counter<u64> {
    meter()
        .u64_counter("kpi_monitor.indicators.evaluations.total")
        .with_description("Total number of indicator evaluations")
        .build()
}

/// Breaches detected
///
/// Labels:
/// - level: warning, critical
pub fn breaches_detected_total() -> Counter<u64> {
    meter()
        .u64_counter("kpi_monitor.breaches.detected.total")
        .with_description("Total number of threshold breaches detected")
        .build()
}

/// Corrective tasks by guard outcome
///
/// Labels:
/// - outcome: created, duplicate, link_missing
pub fn corrective_tasks_total() -> Counter<u64> {
    meter()
        .u64_counter("kpi_monitor.corrective_tasks.total")
        .with_description("Total corrective task guard outcomes")
        .build()
}

/// Indicator pipelines that failed inside a batch
///
/// Labels:
/// - error_category: see `MonitorError::category`
pub fn indicator_failures_total() -> Counter<u64> {
    meter()
        .u64_counter("kpi_monitor.indicators.failures.total")
        .with_description("Total number of failed indicator pipelines")
        .build()
}

/// Breach events that the notifier rejected
pub fn notification_failures_total() -> Counter<u64> {
    meter()
        .u64_counter("kpi_monitor.notifications.failures.total")
        .with_description("Total number of failed breach notifications")
        .build()
}

/// Check-all cycle duration in milliseconds
pub fn cycle_duration() -> Histogram<f64> {
    meter()
        .f64_histogram("kpi_monitor.cycles.duration")
        .with_description("Check-all cycle duration in milliseconds")
        .with_unit("ms")
        .build()
}

// Job queue

/// Labels:
/// - job_kind: process_all, process_one
pub fn jobs_enqueued_total() -> Counter<u64> {
    meter()
        .u64_counter("kpi_monitor.jobs.enqueued.total")
        .with_description("Total number of jobs enqueued")
        .build()
}

/// Labels:
/// - job_kind
/// - outcome: success, retried, failed
pub fn jobs_finished_total() -> Counter<u64> {
    meter()
        .u64_counter("kpi_monitor.jobs.finished.total")
        .with_description("Total number of job attempts by outcome")
        .build()
}

/// Job execution duration in milliseconds
pub fn job_duration() -> Histogram<f64> {
    meter()
        .f64_histogram("kpi_monitor.jobs.duration")
        .with_description("Job execution duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Label helper for job metrics
pub fn job_labels(job_kind: &'static str, outcome: &'static str) -> [KeyValue; 2] {
    [
        KeyValue::new("job_kind", job_kind),
        KeyValue::new("outcome", outcome),
    ]
}
