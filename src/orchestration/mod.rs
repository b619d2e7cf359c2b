//! # Breach Orchestration
//!
//! - **BreachProcessor**: drives evaluation, status transitions, task creation
//!   and notification for one or all indicators
//! - **IdempotencyGuard**: at most one open corrective task per indicator
//! - **IndicatorLocks**: per-indicator single-flight locks
//! - **BackoffCalculator**: retry delays for failed jobs

pub mod backoff_calculator;
pub mod breach_processor;
pub mod idempotency_guard;
pub mod indicator_locks;

pub use backoff_calculator::{BackoffCalculator, BackoffResult, BackoffType};
pub use breach_processor::{BreachProcessor, BreachProcessorConfig};
pub use idempotency_guard::IdempotencyGuard;
pub use indicator_locks::{IndicatorLock, IndicatorLocks};
