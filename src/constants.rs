//! # System Constants
//!
//! Core constants that define the operational boundaries of the KPI monitor:
//! which indicator statuses are evaluated, how corrective tasks are created,
//! and the identifiers used by the scheduler and job queue.

pub use crate::state_machine::{CorrectiveTaskStatus, IndicatorStatus};

/// Breach lifecycle event names used for notification routing and logs
pub mod events {
    pub const BREACH_DETECTED: &str = "indicator.breach_detected";
    pub const BREACH_ESCALATED: &str = "indicator.breach_escalated";
    pub const BREACH_DEESCALATED: &str = "indicator.breach_deescalated";
    pub const CORRECTIVE_TASK_CREATED: &str = "corrective_task.created";
}

pub mod system {
    /// Version compatibility marker
    pub const KPI_MONITOR_VERSION: &str = "0.1.0";

    /// Logical identifier of the recurring check-all registration
    pub const PROCESS_ALL_JOB_ID: &str = "kpi-breach-check-all";

    /// Default recurring interval: every 6 hours
    pub const DEFAULT_CHECK_INTERVAL_SECONDS: u64 = 6 * 60 * 60;

    /// Corrective tasks are due a week after the breach is detected
    pub const DEFAULT_CORRECTIVE_DUE_DAYS: i64 = 7;

    /// Reason string recorded when no task can be created
    pub const NO_LINKED_WORK_CONTAINER: &str = "no linked work container";

    /// Name of the partial unique index guarding open-task uniqueness
    pub const OPEN_TASK_UNIQUE_INDEX: &str = "idx_corrective_tasks_one_open_per_indicator";
}

/// Status groupings for validation and logic
pub mod status_groups {
    use super::{CorrectiveTaskStatus, IndicatorStatus};

    /// Indicator statuses eligible for threshold evaluation
    pub const EVALUATION_ELIGIBLE_STATES: &[IndicatorStatus] = &[
        IndicatorStatus::Active,
        IndicatorStatus::Monitoring,
        IndicatorStatus::Breached,
    ];

    /// Indicator statuses that have not been activated yet
    pub const PRE_ACTIVATION_STATES: &[IndicatorStatus] =
        &[IndicatorStatus::Proposed, IndicatorStatus::UnderReview];

    /// Indicator statuses reported as current breaches
    pub const BREACH_STATES: &[IndicatorStatus] =
        &[IndicatorStatus::Monitoring, IndicatorStatus::Breached];

    /// Corrective task statuses that count as "open"
    pub const OPEN_TASK_STATES: &[CorrectiveTaskStatus] =
        &[CorrectiveTaskStatus::Open, CorrectiveTaskStatus::InProgress];

    /// Corrective task statuses that are final
    pub const TASK_FINAL_STATES: &[CorrectiveTaskStatus] =
        &[CorrectiveTaskStatus::Done, CorrectiveTaskStatus::Cancelled];
}
