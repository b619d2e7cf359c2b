//! Error types for the KPI monitor.
//!

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigurationError;
use crate::messaging::QueueError;
use crate::repository::RepositoryError;
use crate::state_machine::errors::StateMachineError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MonitorError {
    #[error("Indicator not found: {indicator_id}")]
    NotFound { indicator_id: Uuid },
    #[error("Persistence error during {operation}: {reason}")]
    Persistence {
        operation: String,
        reason: String,
        transient: bool,
    },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Messaging error: {0}")]
    Messaging(String),
    #[error("Notification error: {0}")]
    Notification(String),
    #[error("State machine error: {0}")]
    StateMachine(String),
    #[error("Timeout error for operation {operation}: {timeout:?}")]
    Timeout { operation: String, timeout: Duration },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    /// Transient persistence failure, the usual job-level retry trigger
    pub fn transient(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Persistence {
            operation: operation.into(),
            reason: reason.into(),
            transient: true,
        }
    }

    pub fn permanent(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Persistence {
            operation: operation.into(),
            reason: reason.into(),
            transient: false,
        }
    }

    /// Whether the job queue should apply backoff and try again.
    ///
    /// NotFound and configuration gaps are not fixed by retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persistence { transient, .. } => *transient,
            Self::Timeout { .. } | Self::Messaging(_) => true,
            Self::NotFound { .. }
            | Self::Configuration(_)
            | Self::Notification(_)
            | Self::StateMachine(_)
            | Self::Internal(_) => false,
        }
    }

    /// Short machine-friendly category used in metrics labels
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Persistence { transient: true, .. } => "persistence_transient",
            Self::Persistence { .. } => "persistence_permanent",
            Self::Configuration(_) => "configuration",
            Self::Messaging(_) => "messaging",
            Self::Notification(_) => "notification",
            Self::StateMachine(_) => "state_machine",
            Self::Timeout { .. } => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<RepositoryError> for MonitorError {
    fn from(err: RepositoryError) -> Self {
        let transient = err.is_transient();
        Self::Persistence {
            operation: err.operation().to_string(),
            reason: err.to_string(),
            transient,
        }
    }
}

impl From<StateMachineError> for MonitorError {
    fn from(err: StateMachineError) -> Self {
        Self::StateMachine(err.to_string())
    }
}

impl From<QueueError> for MonitorError {
    fn from(err: QueueError) -> Self {
        Self::Messaging(err.to_string())
    }
}

impl From<ConfigurationError> for MonitorError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {err}"))
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;
