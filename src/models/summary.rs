use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::BreachLevel;
use crate::state_machine::IndicatorStatus;

/// Outcome of the idempotency guard for one indicator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectiveTaskResult {
    pub created: bool,
    /// New task id when created; the existing open task id on a duplicate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CorrectiveTaskResult {
    pub fn created(task_id: Uuid) -> Self {
        Self {
            created: true,
            task_id: Some(task_id),
            reason: None,
        }
    }

    pub fn duplicate(task_id: Option<Uuid>) -> Self {
        Self {
            created: false,
            task_id,
            reason: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            created: false,
            task_id: None,
            reason: Some(reason.into()),
        }
    }

    /// A duplicate is a non-creation that found (or collided with) an open task
    pub fn is_duplicate(&self) -> bool {
        !self.created && self.reason.is_none()
    }
}

/// Per-indicator result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub indicator_id: Uuid,
    pub code: String,
    pub previous_status: IndicatorStatus,
    pub new_status: IndicatorStatus,
    pub level: BreachLevel,
    pub current_value: Option<f64>,
    pub target_value: f64,
    pub deviation_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrective_task: Option<CorrectiveTaskResult>,
    pub notified: bool,
    /// Set when this indicator's pipeline failed; the batch carried on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndicatorResult {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Summary returned by a check-all cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total_evaluated: usize,
    pub total_breaches: usize,
    pub tasks_created: usize,
    pub tasks_duplicate: usize,
    pub total_failed: usize,
    pub per_indicator_results: Vec<IndicatorResult>,
}

impl BatchSummary {
    pub fn new(cycle_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            started_at,
            completed_at: started_at,
            total_evaluated: 0,
            total_breaches: 0,
            tasks_created: 0,
            tasks_duplicate: 0,
            total_failed: 0,
            per_indicator_results: Vec::new(),
        }
    }

    /// Fold one indicator result into the totals
    pub fn record(&mut self, result: IndicatorResult) {
        if result.is_failure() {
            self.total_failed += 1;
        } else {
            self.total_evaluated += 1;
            if result.level.is_breach() {
                self.total_breaches += 1;
            }
            if let Some(task) = &result.corrective_task {
                if task.created {
                    self.tasks_created += 1;
                } else if task.is_duplicate() {
                    self.tasks_duplicate += 1;
                }
            }
        }
        self.per_indicator_results.push(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(level: BreachLevel, task: Option<CorrectiveTaskResult>) -> IndicatorResult {
        IndicatorResult {
            indicator_id: Uuid::now_v7(),
            code: "KPI".to_string(),
            previous_status: IndicatorStatus::Active,
            new_status: IndicatorStatus::Breached,
            level,
            current_value: Some(1.0),
            target_value: 2.0,
            deviation_pct: Some(-50.0),
            corrective_task: task,
            notified: false,
            error: None,
        }
    }

    #[test]
    fn test_summary_totals() {
        let mut summary = BatchSummary::new(Uuid::now_v7(), Utc::now());
        summary.record(result(
            BreachLevel::Critical,
            Some(CorrectiveTaskResult::created(Uuid::now_v7())),
        ));
        summary.record(result(
            BreachLevel::Critical,
            Some(CorrectiveTaskResult::duplicate(Some(Uuid::now_v7()))),
        ));
        summary.record(result(
            BreachLevel::Critical,
            Some(CorrectiveTaskResult::skipped("no linked work container")),
        ));
        summary.record(result(BreachLevel::Warning, None));
        summary.record(result(BreachLevel::None, None));

        let mut failed = result(BreachLevel::None, None);
        failed.error = Some("Persistence error".to_string());
        summary.record(failed);

        assert_eq!(summary.total_evaluated, 5);
        assert_eq!(summary.total_breaches, 4);
        assert_eq!(summary.tasks_created, 1);
        assert_eq!(summary.tasks_duplicate, 1);
        assert_eq!(summary.total_failed, 1);
        assert_eq!(summary.per_indicator_results.len(), 6);
    }

    #[test]
    fn test_skipped_task_is_not_duplicate() {
        assert!(!CorrectiveTaskResult::skipped("no linked work container").is_duplicate());
        assert!(CorrectiveTaskResult::duplicate(None).is_duplicate());
    }
}
