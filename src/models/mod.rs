//! # Domain Models
//!
//! Indicator definitions, their time-series points, corrective tasks and the
//! ephemeral evaluation results flowing through the breach pipeline.

pub mod breach;
pub mod corrective_task;
pub mod data_point;
pub mod indicator;
pub mod summary;

// Re-export core models for easy access
pub use breach::{BreachEvent, BreachLevel, BreachVerdict, CurrentBreach};
pub use corrective_task::{CorrectiveActionTask, NewCorrectiveTask, TaskPriority};
pub use data_point::{IndicatorDataPoint, VerificationStatus};
pub use indicator::IndicatorDefinition;
pub use summary::{BatchSummary, CorrectiveTaskResult, IndicatorResult};
