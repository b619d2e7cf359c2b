use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Verification state of an ingested data point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(Self::Unverified),
            "verified" => Ok(Self::Verified),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid verification status: {s}")),
        }
    }
}

/// One pre-computed observation of an indicator over a period
///
/// Immutable once ingested. Periods never overlap for the same indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorDataPoint {
    pub data_point_id: Uuid,
    pub indicator_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub actual_value: f64,
    pub collected_at: DateTime<Utc>,
    pub verification_status: VerificationStatus,
}

impl IndicatorDataPoint {
    pub fn new(
        indicator_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        actual_value: f64,
    ) -> Self {
        Self {
            data_point_id: Uuid::now_v7(),
            indicator_id,
            period_start,
            period_end,
            actual_value,
            collected_at: Utc::now(),
            verification_status: VerificationStatus::Unverified,
        }
    }

    /// Whether two points for the same indicator cover overlapping periods
    pub fn overlaps(&self, other: &Self) -> bool {
        self.indicator_id == other.indicator_id
            && self.period_start < other.period_end
            && other.period_start < self.period_end
    }
}
