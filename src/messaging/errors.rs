//! # Messaging Error Types

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: Uuid },

    /// The receipt no longer owns the job (visibility expired and the job was
    /// redelivered, or the job already finished)
    #[error("Stale receipt for job {job_id}")]
    StaleReceipt { job_id: Uuid },

    #[error("Job {job_id} is {state}, expected {expected}")]
    InvalidState {
        job_id: Uuid,
        state: String,
        expected: &'static str,
    },

    #[error("Job serialization error: {0}")]
    Serialization(String),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Queue query failed during {operation}: {reason}")]
    QueryFailed {
        operation: &'static str,
        reason: String,
    },
}

impl QueueError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Classify a sqlx error for the given queue operation
    pub fn from_sqlx(operation: &'static str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Tls(_) => Self::Unavailable(format!("{operation}: {err}")),
            _ => Self::QueryFailed {
                operation,
                reason: err.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
