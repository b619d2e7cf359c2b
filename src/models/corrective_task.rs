use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::state_machine::CorrectiveTaskStatus;

/// Priority of a corrective action task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Invalid task priority: {s}")),
        }
    }
}

/// Work item created in response to a critical breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectiveActionTask {
    pub task_id: Uuid,
    pub indicator_id: Uuid,
    pub work_container_id: Uuid,
    pub status: CorrectiveTaskStatus,
    pub priority: TaskPriority,
    pub due_date: DateTime<Utc>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl CorrectiveActionTask {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// New corrective task for creation (without generated fields)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCorrectiveTask {
    pub indicator_id: Uuid,
    pub work_container_id: Uuid,
    pub priority: TaskPriority,
    pub due_date: DateTime<Utc>,
    pub owner_id: Uuid,
}

impl NewCorrectiveTask {
    /// Materialize the task with a fresh id in the Open state
    pub fn into_task(self, created_at: DateTime<Utc>) -> CorrectiveActionTask {
        CorrectiveActionTask {
            task_id: Uuid::now_v7(),
            indicator_id: self.indicator_id,
            work_container_id: self.work_container_id,
            status: CorrectiveTaskStatus::Open,
            priority: self.priority,
            due_date: self.due_date,
            owner_id: self.owner_id,
            created_at,
        }
    }
}
