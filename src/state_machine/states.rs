use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::BreachLevel;

/// Indicator lifecycle and health states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorStatus {
    /// Drafted, not yet reviewed
    Proposed,
    /// Under review by its steward
    UnderReview,
    /// Activated and within thresholds
    Active,
    /// Activated, latest value past the warning threshold
    Monitoring,
    /// Activated, latest value past the critical threshold
    Breached,
    /// Permanently withdrawn from evaluation
    Retired,
}

impl IndicatorStatus {
    /// Check if this indicator takes part in threshold evaluation
    pub fn is_evaluation_eligible(&self) -> bool {
        matches!(self, Self::Active | Self::Monitoring | Self::Breached)
    }

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Retired)
    }

    /// The breach level this status reflects from the last evaluation
    ///
    /// Pre-activation and retired indicators carry no level.
    pub fn reflected_level(&self) -> Option<BreachLevel> {
        match self {
            Self::Active => Some(BreachLevel::None),
            Self::Monitoring => Some(BreachLevel::Warning),
            Self::Breached => Some(BreachLevel::Critical),
            Self::Proposed | Self::UnderReview | Self::Retired => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::UnderReview => "under_review",
            Self::Active => "active",
            Self::Monitoring => "monitoring",
            Self::Breached => "breached",
            Self::Retired => "retired",
        }
    }
}

impl fmt::Display for IndicatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IndicatorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(Self::Proposed),
            "under_review" => Ok(Self::UnderReview),
            "active" => Ok(Self::Active),
            "monitoring" => Ok(Self::Monitoring),
            "breached" => Ok(Self::Breached),
            "retired" => Ok(Self::Retired),
            _ => Err(format!("Invalid indicator status: {s}")),
        }
    }
}

/// Corrective action task states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectiveTaskStatus {
    /// Created, not yet picked up
    Open,
    /// Being worked by its owner
    InProgress,
    /// Completed
    Done,
    /// Withdrawn without completion
    Cancelled,
}

impl CorrectiveTaskStatus {
    /// Open tasks count against the one-open-task-per-indicator rule
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CorrectiveTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CorrectiveTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid corrective task status: {s}")),
        }
    }
}

/// Default state for new corrective tasks
impl Default for CorrectiveTaskStatus {
    fn default() -> Self {
        Self::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_eligibility() {
        assert!(IndicatorStatus::Active.is_evaluation_eligible());
        assert!(IndicatorStatus::Monitoring.is_evaluation_eligible());
        assert!(IndicatorStatus::Breached.is_evaluation_eligible());
        assert!(!IndicatorStatus::Proposed.is_evaluation_eligible());
        assert!(!IndicatorStatus::UnderReview.is_evaluation_eligible());
        assert!(!IndicatorStatus::Retired.is_evaluation_eligible());
        assert!(IndicatorStatus::Retired.is_terminal());
    }

    #[test]
    fn test_reflected_level() {
        assert_eq!(IndicatorStatus::Active.reflected_level(), Some(BreachLevel::None));
        assert_eq!(
            IndicatorStatus::Breached.reflected_level(),
            Some(BreachLevel::Critical)
        );
        assert_eq!(IndicatorStatus::Proposed.reflected_level(), None);
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(IndicatorStatus::UnderReview.to_string(), "under_review");
        assert_eq!(
            "breached".parse::<IndicatorStatus>().unwrap(),
            IndicatorStatus::Breached
        );
        assert!("paused".parse::<IndicatorStatus>().is_err());

        assert_eq!(CorrectiveTaskStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            "cancelled".parse::<CorrectiveTaskStatus>().unwrap(),
            CorrectiveTaskStatus::Cancelled
        );
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&IndicatorStatus::UnderReview).unwrap();
        assert_eq!(json, "\"under_review\"");

        let parsed: CorrectiveTaskStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert!(parsed.is_open());
    }
}
