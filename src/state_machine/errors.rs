use thiserror::Error;
use uuid::Uuid;

use crate::state_machine::IndicatorStatus;

/// Errors raised by the indicator health state machine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Indicator {indicator_id} in status {status} is not eligible for evaluation")]
    IneligibleStatus {
        indicator_id: Uuid,
        status: IndicatorStatus,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: IndicatorStatus,
        to: IndicatorStatus,
    },
}

/// Result type alias for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;
