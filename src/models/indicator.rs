use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::breach::BreachLevel;
use crate::state_machine::IndicatorStatus;

/// A tracked performance indicator with its target and thresholds
///
/// Thresholds are percentages of deviation from `target_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorDefinition {
    pub indicator_id: Uuid,
    pub code: String,
    pub name: String,
    pub category: String,
    pub target_value: f64,
    pub unit: String,
    pub threshold_warning: Option<f64>,
    pub threshold_critical: Option<f64>,
    pub status: IndicatorStatus,
    pub steward_id: Uuid,
    /// Ordered, de-duplicated set of work containers tasks can be filed under
    pub linked_work_container_ids: Vec<Uuid>,
    /// Level of the last breach event subscribers received
    #[serde(default)]
    pub last_notified_level: BreachLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndicatorDefinition {
    /// Build an active indicator with no thresholds or links
    pub fn new(code: impl Into<String>, name: impl Into<String>, target_value: f64) -> Self {
        let now = Utc::now();
        Self {
            indicator_id: Uuid::now_v7(),
            code: code.into(),
            name: name.into(),
            category: "general".to_string(),
            target_value,
            unit: String::new(),
            threshold_warning: None,
            threshold_critical: None,
            status: IndicatorStatus::Active,
            steward_id: Uuid::now_v7(),
            linked_work_container_ids: Vec::new(),
            last_notified_level: BreachLevel::None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_thresholds(mut self, warning: Option<f64>, critical: Option<f64>) -> Self {
        self.threshold_warning = warning;
        self.threshold_critical = critical;
        self
    }

    pub fn with_status(mut self, status: IndicatorStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_steward(mut self, steward_id: Uuid) -> Self {
        self.steward_id = steward_id;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Link a work container, keeping insertion order and skipping duplicates
    pub fn with_linked_work_container(mut self, container_id: Uuid) -> Self {
        if !self.linked_work_container_ids.contains(&container_id) {
            self.linked_work_container_ids.push(container_id);
        }
        self
    }

    /// Work container a new corrective task is filed under
    pub fn primary_work_container(&self) -> Option<Uuid> {
        self.linked_work_container_ids.first().copied()
    }

    pub fn is_evaluation_eligible(&self) -> bool {
        self.status.is_evaluation_eligible()
    }
}
