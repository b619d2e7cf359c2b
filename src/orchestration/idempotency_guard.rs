//! # Idempotency Guard
//!
//! Maintains open-task uniqueness: at most one `Open`/`InProgress` corrective
//! task per indicator.
//!
//! Two layers cooperate:
//!
//! 1. A per-indicator async lock serializes the find-then-create sequence for
//!    evaluations running inside this process.
//! 2. The repository's uniqueness constraint rejects the loser of any race the
//!    lock cannot see (another process, another host). A rejected insert is
//!    handled exactly like finding the open task up front.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::constants::system::NO_LINKED_WORK_CONTAINER;
use crate::errors::MonitorResult;
use crate::models::{
    BreachVerdict, CorrectiveTaskResult, IndicatorDefinition, NewCorrectiveTask, TaskPriority,
};
use crate::orchestration::indicator_locks::IndicatorLocks;
use crate::repository::{CreateTaskOutcome, IndicatorRepository};

pub struct IdempotencyGuard {
    repository: Arc<dyn IndicatorRepository>,
    due_in: Duration,
    locks: IndicatorLocks,
}

impl std::fmt::Debug for IdempotencyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyGuard")
            .field("backend", &self.repository.backend_name())
            .field("due_in_days", &self.due_in.num_days())
            .field("held_locks", &self.locks.held())
            .finish()
    }
}

impl IdempotencyGuard {
    pub fn new(repository: Arc<dyn IndicatorRepository>, due_in_days: i64) -> Self {
        Self {
            repository,
            due_in: Duration::days(due_in_days),
            locks: IndicatorLocks::new(),
        }
    }

    /// Ensure a corrective task exists for a critical verdict
    ///
    /// Returns `None` for non-critical verdicts. Otherwise reports whether a
    /// task was created, an existing open task was found, or creation was
    /// impossible (no linked work container).
    pub async fn ensure_corrective_task(
        &self,
        indicator: &IndicatorDefinition,
        verdict: &BreachVerdict,
    ) -> MonitorResult<Option<CorrectiveTaskResult>> {
        if !verdict.is_critical() {
            return Ok(None);
        }

        let _held = self.locks.acquire(indicator.indicator_id).await;
        self.find_or_create(indicator, verdict).await.map(Some)
    }

    async fn find_or_create(
        &self,
        indicator: &IndicatorDefinition,
        verdict: &BreachVerdict,
    ) -> MonitorResult<CorrectiveTaskResult> {
        let indicator_id = indicator.indicator_id;

        if let Some(existing) = self.repository.find_open_task(indicator_id).await? {
            debug!(
                indicator_id = %indicator_id,
                task_id = %existing.task_id,
                task_status = %existing.status,
                "Open corrective task already exists"
            );
            return Ok(CorrectiveTaskResult::duplicate(Some(existing.task_id)));
        }

        let Some(work_container_id) = indicator.primary_work_container() else {
            warn!(
                indicator_id = %indicator_id,
                code = %indicator.code,
                "Critical breach but no linked work container, corrective task not created"
            );
            return Ok(CorrectiveTaskResult::skipped(NO_LINKED_WORK_CONTAINER));
        };

        let request = NewCorrectiveTask {
            indicator_id,
            work_container_id,
            priority: TaskPriority::High,
            due_date: verdict.evaluated_at + self.due_in,
            owner_id: indicator.steward_id,
        };

        match self.repository.create_corrective_task(request).await? {
            CreateTaskOutcome::Created(task) => {
                info!(
                    indicator_id = %indicator_id,
                    task_id = %task.task_id,
                    owner_id = %task.owner_id,
                    due_date = %task.due_date,
                    "Corrective task created"
                );
                Ok(CorrectiveTaskResult::created(task.task_id))
            }
            CreateTaskOutcome::UniqueViolation => {
                // Lost a race with another writer; report the winner's task
                let winner = self.repository.find_open_task(indicator_id).await?;
                debug!(
                    indicator_id = %indicator_id,
                    winning_task_id = ?winner.as_ref().map(|task| task.task_id),
                    "Corrective task insert collided with an existing open task"
                );
                Ok(CorrectiveTaskResult::duplicate(
                    winner.map(|task| task.task_id),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::ThresholdEvaluator;
    use crate::models::IndicatorDataPoint;
    use crate::repository::InMemoryIndicatorRepository;
    use chrono::Utc;
    use uuid::Uuid;

    fn breached_indicator(linked: bool) -> IndicatorDefinition {
        let indicator = IndicatorDefinition::new("OTD", "On-time delivery", 95.0)
            .with_thresholds(Some(8.0), Some(15.0));
        if linked {
            indicator.with_linked_work_container(Uuid::now_v7())
        } else {
            indicator
        }
    }

    fn critical_verdict(indicator: &IndicatorDefinition) -> BreachVerdict {
        let now = Utc::now();
        let point = IndicatorDataPoint::new(
            indicator.indicator_id,
            now - Duration::days(30),
            now,
            72.5,
        );
        ThresholdEvaluator::new().evaluate(indicator, Some(&point), now)
    }

    #[tokio::test]
    async fn test_creates_once_then_reports_duplicate() {
        let repository = Arc::new(InMemoryIndicatorRepository::new());
        let guard = IdempotencyGuard::new(repository.clone(), 7);
        let indicator = breached_indicator(true);
        repository.insert_indicator(indicator.clone());
        let verdict = critical_verdict(&indicator);

        let first = guard
            .ensure_corrective_task(&indicator, &verdict)
            .await
            .unwrap()
            .unwrap();
        assert!(first.created);

        let second = guard
            .ensure_corrective_task(&indicator, &verdict)
            .await
            .unwrap()
            .unwrap();
        assert!(second.is_duplicate());
        assert_eq!(second.task_id, first.task_id);
        assert_eq!(repository.open_task_count(indicator.indicator_id), 1);
    }

    #[tokio::test]
    async fn test_task_fields_follow_indicator_and_verdict() {
        let repository = Arc::new(InMemoryIndicatorRepository::new());
        let guard = IdempotencyGuard::new(repository.clone(), 7);
        let indicator = breached_indicator(true);
        repository.insert_indicator(indicator.clone());
        let verdict = critical_verdict(&indicator);

        guard
            .ensure_corrective_task(&indicator, &verdict)
            .await
            .unwrap();

        let tasks = repository.tasks_for(indicator.indicator_id);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].priority, TaskPriority::High);
        assert_eq!(tasks[0].owner_id, indicator.steward_id);
        assert_eq!(tasks[0].due_date, verdict.evaluated_at + Duration::days(7));
        assert_eq!(
            Some(tasks[0].work_container_id),
            indicator.primary_work_container()
        );
    }

    #[tokio::test]
    async fn test_missing_link_is_skipped_with_reason() {
        let repository = Arc::new(InMemoryIndicatorRepository::new());
        let guard = IdempotencyGuard::new(repository.clone(), 7);
        let indicator = breached_indicator(false);
        repository.insert_indicator(indicator.clone());

        let result = guard
            .ensure_corrective_task(&indicator, &critical_verdict(&indicator))
            .await
            .unwrap()
            .unwrap();

        assert!(!result.created);
        assert_eq!(result.reason.as_deref(), Some(NO_LINKED_WORK_CONTAINER));
        assert!(!result.is_duplicate());
        assert_eq!(repository.open_task_count(indicator.indicator_id), 0);
    }

    #[tokio::test]
    async fn test_non_critical_verdict_is_noop() {
        let repository = Arc::new(InMemoryIndicatorRepository::new());
        let guard = IdempotencyGuard::new(repository.clone(), 7);
        let indicator = breached_indicator(true);
        let mut verdict = critical_verdict(&indicator);
        verdict.level = crate::models::BreachLevel::Warning;

        let result = guard
            .ensure_corrective_task(&indicator, &verdict)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(repository.create_attempts(), 0);
    }

    #[tokio::test]
    async fn test_lock_entries_are_released() {
        let repository = Arc::new(InMemoryIndicatorRepository::new());
        let guard = IdempotencyGuard::new(repository.clone(), 7);
        let indicator = breached_indicator(true);
        repository.insert_indicator(indicator.clone());

        guard
            .ensure_corrective_task(&indicator, &critical_verdict(&indicator))
            .await
            .unwrap();
        assert_eq!(guard.locks.held(), 0);
    }
}
