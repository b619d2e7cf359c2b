//! # Indicator Health State Machine
//!
//! Pure transition function from (current status, breach level) to the next
//! status. Only evaluation-eligible statuses are accepted; `Retired` and the
//! pre-activation statuses are reachable only through external actions.
//!
//! | current    | None   | Warning    | Critical |
//! |------------|--------|------------|----------|
//! | Active     | Active | Monitoring | Breached |
//! | Monitoring | Active | Monitoring | Breached |
//! | Breached   | Active | Monitoring | Breached |

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::events;
use crate::models::BreachLevel;
use crate::state_machine::errors::{StateMachineError, StateMachineResult};
use crate::state_machine::IndicatorStatus;

/// Compute the next health status for an evaluated indicator
pub fn next_status(
    indicator_id: Uuid,
    current: IndicatorStatus,
    level: BreachLevel,
) -> StateMachineResult<IndicatorStatus> {
    if !current.is_evaluation_eligible() {
        return Err(StateMachineError::IneligibleStatus {
            indicator_id,
            status: current,
        });
    }

    // Recovery is immediate: any in-threshold reading returns to Active.
    Ok(match level {
        BreachLevel::None => IndicatorStatus::Active,
        BreachLevel::Warning => IndicatorStatus::Monitoring,
        BreachLevel::Critical => IndicatorStatus::Breached,
    })
}

/// A computed health transition for one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthTransition {
    pub from: IndicatorStatus,
    pub to: IndicatorStatus,
    pub level: BreachLevel,
}

impl HealthTransition {
    pub fn compute(
        indicator_id: Uuid,
        current: IndicatorStatus,
        level: BreachLevel,
    ) -> StateMachineResult<Self> {
        let to = next_status(indicator_id, current, level)?;
        Ok(Self {
            from: current,
            to,
            level,
        })
    }

    /// Whether the status write is needed at all
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }

    /// Breach events are emitted when the level is a breach and differs from
    /// the last level subscribers were told about. `last_notified` is only
    /// advanced after a successful publish, so a lost or failed publish is
    /// retried by the next evaluation.
    pub fn should_notify(&self, last_notified: BreachLevel) -> bool {
        self.level.is_breach() && self.level != last_notified
    }

    /// Event name for the notification this evaluation owes, if any
    pub fn event_name(&self, last_notified: BreachLevel) -> Option<&'static str> {
        if !self.should_notify(last_notified) {
            return None;
        }
        Some(match (last_notified, self.level) {
            (BreachLevel::Warning, BreachLevel::Critical) => events::BREACH_ESCALATED,
            (BreachLevel::Critical, BreachLevel::Warning) => events::BREACH_DEESCALATED,
            _ => events::BREACH_DETECTED,
        })
    }

    /// A recovery clears the notified level so the next breach is a fresh detection
    pub fn clears_notified_level(&self, last_notified: BreachLevel) -> bool {
        !self.level.is_breach() && last_notified.is_breach()
    }
}
