//! # Monitoring Jobs
//!
//! The typed job union the worker pool dispatches on, the envelope the queue
//! stores it in, and the typed execution outcome that drives retry decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::MonitorError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitoringJob {
    ProcessAll,
    ProcessOne { indicator_id: Uuid },
}

impl MonitoringJob {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ProcessAll => "process_all",
            Self::ProcessOne { .. } => "process_one",
        }
    }

    /// Dedup key used for on-demand enqueues
    pub fn default_dedup_key(&self) -> String {
        match self {
            Self::ProcessAll => "process_all".to_string(),
            Self::ProcessOne { indicator_id } => format!("process_one:{indicator_id}"),
        }
    }
}

impl fmt::Display for MonitoringJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessAll => f.write_str("process_all"),
            Self::ProcessOne { indicator_id } => write!(f, "process_one({indicator_id})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    InFlight,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

/// A job as stored by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: Uuid,
    pub job: MonitoringJob,
    pub dedup_key: Option<String>,
    pub state: JobState,
    pub enqueued_at: DateTime<Utc>,
    /// Deliveries so far, including the current one
    pub attempts: u32,
    /// Not deliverable before this instant (retry delay or visibility timeout)
    pub visible_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobEnvelope {
    pub fn new(job: MonitoringJob, dedup_key: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::now_v7(),
            job,
            dedup_key,
            state: JobState::Pending,
            enqueued_at: now,
            attempts: 0,
            visible_at: now,
            last_error: None,
            finished_at: None,
        }
    }
}

/// Opaque handle proving ownership of one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle {
    pub job_id: Uuid,
    pub delivery_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedJob {
    pub envelope: JobEnvelope,
    pub receipt: ReceiptHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(Uuid),
    /// An active job with the same dedup key already exists
    Deduplicated(Uuid),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            Self::Enqueued(id) | Self::Deduplicated(id) => *id,
        }
    }

    pub fn is_enqueued(&self) -> bool {
        matches!(self, Self::Enqueued(_))
    }
}

/// Typed result of one job execution
#[derive(Debug, Clone, PartialEq)]
pub enum JobExecutionResult {
    Success,
    /// Apply backoff and try again (unless attempts are exhausted)
    Retryable {
        reason: String,
        retry_after: Option<Duration>,
    },
    /// Park the job as failed; retrying cannot help
    Permanent { reason: String },
}

impl JobExecutionResult {
    pub fn outcome_name(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Retryable { .. } => "retryable",
            Self::Permanent { .. } => "permanent",
        }
    }
}

impl From<MonitorError> for JobExecutionResult {
    fn from(err: MonitorError) -> Self {
        if err.is_retryable() {
            Self::Retryable {
                reason: err.to_string(),
                retry_after: None,
            }
        } else {
            Self::Permanent {
                reason: err.to_string(),
            }
        }
    }
}
