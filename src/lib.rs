#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # KPI Monitor Core
//!
//! Periodic evaluation of performance indicators against their targets,
//! breach detection, indicator health tracking and idempotent creation of
//! corrective-action tasks.
//!
//! ## Architecture
//!
//! ```text
//! RecurringScheduler -> JobQueue -> WorkerPool -> BreachJobHandler -> BreachProcessor
//!                                                                       |- ThresholdEvaluator
//!                                                                       |- HealthTransition
//!                                                                       |- IdempotencyGuard
//!                                                                       |- IndicatorRepository
//!                                                                       '- BreachNotifier
//! ```
//!
//! Delivery is at-least-once, so every pipeline write is either a pure
//! function of current state (status transitions) or protected by open-task
//! uniqueness (corrective tasks).
//!
//! ## Module Organization
//!
//! - [`models`] - Indicators, data points, corrective tasks, verdicts, summaries
//! - [`evaluation`] - Threshold evaluator
//! - [`state_machine`] - Indicator/task statuses and the health transition table
//! - [`repository`] - Persistence trait, in-memory and PostgreSQL backends
//! - [`orchestration`] - Breach processor, idempotency guard, backoff
//! - [`messaging`] - Job union and the visibility-timeout job queue
//! - [`execution`] - Worker pool and job handlers
//! - [`scheduler`] - Recurring and on-demand job enqueueing
//! - [`notification`] - Breach event dispatch
//! - [`config`] - Layered configuration
//! - [`errors`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kpi_monitor::bootstrap::MonitoringSystem;
//! use kpi_monitor::config::KpiMonitorConfig;
//! use kpi_monitor::notification::BroadcastBreachPublisher;
//! use kpi_monitor::repository::InMemoryIndicatorRepository;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let system = MonitoringSystem::bootstrap(
//!     KpiMonitorConfig::default(),
//!     Arc::new(InMemoryIndicatorRepository::new()),
//!     Arc::new(BroadcastBreachPublisher::default()),
//! )?;
//! system.start()?;
//! let summary = system.processor().process_all().await?;
//! println!("evaluated {} indicators", summary.total_evaluated);
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod errors;
pub mod evaluation;
pub mod execution;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod notification;
pub mod orchestration;
pub mod repository;
pub mod scheduler;
pub mod state_machine;

pub use bootstrap::MonitoringSystem;
pub use config::{ConfigManager, ConfigurationError, KpiMonitorConfig};
pub use errors::{MonitorError, MonitorResult};
pub use evaluation::ThresholdEvaluator;
pub use execution::{BreachJobHandler, JobHandler, WorkerPool};
pub use messaging::{InMemoryJobQueue, JobExecutionResult, JobQueue, MonitoringJob};
pub use models::{
    BatchSummary, BreachEvent, BreachLevel, BreachVerdict, CorrectiveActionTask,
    CorrectiveTaskResult, CurrentBreach, IndicatorDataPoint, IndicatorDefinition,
    IndicatorResult,
};
pub use notification::{BreachNotifier, BroadcastBreachPublisher};
pub use orchestration::{BreachProcessor, IdempotencyGuard};
pub use repository::{
    InMemoryIndicatorRepository, IndicatorRepository, PgIndicatorRepository, RepositoryError,
};
pub use scheduler::RecurringScheduler;
pub use state_machine::{CorrectiveTaskStatus, IndicatorStatus};
