// State machine module for indicator health tracking
//
// Indicator and corrective-task status definitions plus the pure health
// transition function applied by the breach processor.

pub mod errors;
pub mod health_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use health_state_machine::{next_status, HealthTransition};
pub use states::{CorrectiveTaskStatus, IndicatorStatus};
