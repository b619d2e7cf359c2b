use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::state_machine::IndicatorStatus;

/// Severity of a threshold breach
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BreachLevel {
    #[default]
    None,
    Warning,
    Critical,
}

impl BreachLevel {
    pub fn is_breach(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for BreachLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BreachLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Invalid breach level: {s}")),
        }
    }
}

/// Result of evaluating one indicator against its latest data point
///
/// Never persisted as-is; only reflected into the indicator status and, on
/// `Critical`, into a corrective task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreachVerdict {
    pub indicator_id: Uuid,
    /// `None` when the indicator has no data points yet
    pub current_value: Option<f64>,
    pub target_value: f64,
    /// `None` when deviation is undefined (no data, zero target, non-finite value)
    pub deviation_pct: Option<f64>,
    pub level: BreachLevel,
    pub evaluated_at: DateTime<Utc>,
}

impl BreachVerdict {
    /// Whether a data point was available to evaluate
    pub fn has_data(&self) -> bool {
        self.current_value.is_some()
    }

    pub fn is_critical(&self) -> bool {
        self.level == BreachLevel::Critical
    }
}

/// Event handed to the notification dispatcher on breach detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreachEvent {
    pub event_id: Uuid,
    pub event_name: String,
    pub indicator_id: Uuid,
    pub indicator_code: String,
    pub level: BreachLevel,
    pub previous_level: BreachLevel,
    pub current_value: f64,
    pub target_value: f64,
    pub deviation_pct: f64,
    pub owner_id: Uuid,
    pub detected_at: DateTime<Utc>,
}

/// An indicator currently sitting at Warning or Critical
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentBreach {
    pub indicator_id: Uuid,
    pub code: String,
    pub name: String,
    pub status: IndicatorStatus,
    pub level: BreachLevel,
    pub steward_id: Uuid,
    pub since: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_string_conversion() {
        assert_eq!("critical".parse::<BreachLevel>().unwrap(), BreachLevel::Critical);
        assert_eq!(BreachLevel::Warning.to_string(), "warning");
        assert_eq!(BreachLevel::default(), BreachLevel::None);
        assert!("severe".parse::<BreachLevel>().is_err());
    }
}
