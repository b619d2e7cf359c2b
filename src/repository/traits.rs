//! # Indicator Repository Trait
//!
//! Persistence seam for indicator definitions, their series points and the
//! corrective tasks created for them.

use async_trait::async_trait;
use uuid::Uuid;

use super::errors::RepositoryResult;
use crate::models::{
    BreachLevel, CorrectiveActionTask, IndicatorDataPoint, IndicatorDefinition, NewCorrectiveTask,
};
use crate::state_machine::IndicatorStatus;

/// Outcome of a corrective task insert
#[derive(Debug, Clone, PartialEq)]
pub enum CreateTaskOutcome {
    Created(CorrectiveActionTask),
    /// The open-task uniqueness constraint rejected the insert
    UniqueViolation,
}

/// Repository consumed by the breach processor
///
/// Implementations that can enforce open-task uniqueness at write time (a
/// unique index, a lock) must report a rejected insert as
/// [`CreateTaskOutcome::UniqueViolation`] rather than as an error.
#[async_trait]
pub trait IndicatorRepository: Send + Sync + 'static {
    /// Indicators with status in {Active, Monitoring, Breached}
    async fn list_eligible_indicators(&self) -> RepositoryResult<Vec<IndicatorDefinition>>;

    /// Look up one indicator regardless of its status
    async fn get_indicator(&self, indicator_id: Uuid)
        -> RepositoryResult<Option<IndicatorDefinition>>;

    /// Most recent point by `period_end`
    async fn get_latest_data_point(
        &self,
        indicator_id: Uuid,
    ) -> RepositoryResult<Option<IndicatorDataPoint>>;

    /// Compare-and-set the health status
    ///
    /// Applied only while the stored status still equals `expected` and is
    /// evaluation-eligible. Returns whether the write was applied; a missing
    /// indicator is reported as not applied.
    async fn update_indicator_status(
        &self,
        indicator_id: Uuid,
        expected: IndicatorStatus,
        new_status: IndicatorStatus,
    ) -> RepositoryResult<bool>;

    /// Record the breach level of the last event subscribers received
    async fn record_notified_level(
        &self,
        indicator_id: Uuid,
        level: BreachLevel,
    ) -> RepositoryResult<()>;

    /// Task with status in {Open, InProgress}, if any
    async fn find_open_task(&self, indicator_id: Uuid)
        -> RepositoryResult<Option<CorrectiveActionTask>>;

    async fn create_corrective_task(
        &self,
        task: NewCorrectiveTask,
    ) -> RepositoryResult<CreateTaskOutcome>;

    /// Backend name for logging/metrics
    fn backend_name(&self) -> &'static str;
}
