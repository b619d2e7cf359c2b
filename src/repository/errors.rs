use thiserror::Error;

/// Errors surfaced by repository implementations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    /// Backend unreachable or timed out; worth retrying
    #[error("Repository unavailable during {operation}: {reason}")]
    Unavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("Query failed during {operation}: {reason}")]
    QueryFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("Invalid row data during {operation}: {field}={value}")]
    InvalidRowData {
        operation: &'static str,
        field: &'static str,
        value: String,
    },
}

impl RepositoryError {
    pub fn unavailable(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            operation,
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Unavailable { operation, .. }
            | Self::QueryFailed { operation, .. }
            | Self::InvalidRowData { operation, .. } => operation,
        }
    }

    /// Classify a sqlx error for the given operation
    pub fn from_sqlx(operation: &'static str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Tls(_) => Self::Unavailable {
                operation,
                reason: err.to_string(),
            },
            _ => Self::QueryFailed {
                operation,
                reason: err.to_string(),
            },
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
