//! # Threshold Evaluator
//!
//! `deviation_pct = (actual - target) / target * 100`. The level is
//! `Critical` when a critical threshold is set and `|deviation_pct| >=` it,
//! otherwise `Warning` under the same rule for the warning threshold, otherwise
//! `None`. Boundaries are inclusive.
//!
//! Thresholds are expressed as percentages of deviation, not as absolute
//! values of the indicator.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::models::{BreachLevel, BreachVerdict, IndicatorDataPoint, IndicatorDefinition};

/// Percentage deviation of `actual` from `target`
///
/// Returns `None` when the deviation is undefined: a zero target or any
/// non-finite input.
pub fn deviation_pct(actual: f64, target: f64) -> Option<f64> {
    if !actual.is_finite() || !target.is_finite() || target == 0.0 {
        return None;
    }
    let deviation = (actual - target) / target * 100.0;
    deviation.is_finite().then_some(deviation)
}

/// Stateless evaluator; carries no configuration of its own
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdEvaluator;

impl ThresholdEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `definition` against its most recent data point
    ///
    /// A missing point yields level `None` with no current value, which the
    /// breach processor treats as a no-op.
    pub fn evaluate(
        &self,
        definition: &IndicatorDefinition,
        latest: Option<&IndicatorDataPoint>,
        evaluated_at: DateTime<Utc>,
    ) -> BreachVerdict {
        let Some(point) = latest else {
            return BreachVerdict {
                indicator_id: definition.indicator_id,
                current_value: None,
                target_value: definition.target_value,
                deviation_pct: None,
                level: BreachLevel::None,
                evaluated_at,
            };
        };

        let deviation = deviation_pct(point.actual_value, definition.target_value);
        let level = match deviation {
            Some(deviation) => Self::classify(
                deviation,
                definition.threshold_warning,
                definition.threshold_critical,
            ),
            None => {
                warn!(
                    indicator_id = %definition.indicator_id,
                    code = %definition.code,
                    target_value = definition.target_value,
                    actual_value = point.actual_value,
                    "Deviation undefined for indicator, treating as within thresholds"
                );
                BreachLevel::None
            }
        };

        BreachVerdict {
            indicator_id: definition.indicator_id,
            current_value: Some(point.actual_value),
            target_value: definition.target_value,
            deviation_pct: deviation,
            level,
            evaluated_at,
        }
    }

    /// Map a deviation onto a breach level; critical is checked first
    pub fn classify(
        deviation_pct: f64,
        threshold_warning: Option<f64>,
        threshold_critical: Option<f64>,
    ) -> BreachLevel {
        let magnitude = deviation_pct.abs();
        if threshold_critical.is_some_and(|critical| magnitude >= critical) {
            BreachLevel::Critical
        } else if threshold_warning.is_some_and(|warning| magnitude >= warning) {
            BreachLevel::Warning
        } else {
            BreachLevel::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn on_time_delivery() -> IndicatorDefinition {
        IndicatorDefinition::new("OTD", "On-time delivery", 95.0)
            .with_thresholds(Some(8.0), Some(15.0))
            .with_unit("%")
    }

    fn point_for(indicator: &IndicatorDefinition, actual: f64) -> IndicatorDataPoint {
        let end = Utc::now();
        IndicatorDataPoint::new(indicator.indicator_id, end - Duration::days(30), end, actual)
    }

    #[test]
    fn test_critical_breach_below_target() {
        let indicator = on_time_delivery();
        let point = point_for(&indicator, 72.5);

        let verdict = ThresholdEvaluator::new().evaluate(&indicator, Some(&point), Utc::now());

        assert_eq!(verdict.level, BreachLevel::Critical);
        assert_eq!(verdict.current_value, Some(72.5));
        let deviation = verdict.deviation_pct.unwrap();
        assert!((deviation - (-23.684_210_526)).abs() < 1e-6);
    }

    #[test]
    fn test_small_deviation_is_within_thresholds() {
        let indicator = on_time_delivery();
        let point = point_for(&indicator, 94.0);

        let verdict = ThresholdEvaluator::new().evaluate(&indicator, Some(&point), Utc::now());

        assert_eq!(verdict.level, BreachLevel::None);
        assert!((verdict.deviation_pct.unwrap() - (-1.052_631_578)).abs() < 1e-6);
    }

    #[test]
    fn test_warning_band() {
        let indicator = on_time_delivery();
        // -10%: past warning (8) but short of critical (15)
        let point = point_for(&indicator, 85.5);

        let verdict = ThresholdEvaluator::new().evaluate(&indicator, Some(&point), Utc::now());
        assert_eq!(verdict.level, BreachLevel::Warning);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        // 80 -> 90 is exactly +12.5%
        assert_eq!(deviation_pct(90.0, 80.0), Some(12.5));
        assert_eq!(
            ThresholdEvaluator::classify(12.5, Some(5.0), Some(12.5)),
            BreachLevel::Critical
        );
        assert_eq!(
            ThresholdEvaluator::classify(12.5, Some(12.5), None),
            BreachLevel::Warning
        );
        assert_eq!(
            ThresholdEvaluator::classify(-12.5, Some(12.5), Some(20.0)),
            BreachLevel::Warning
        );
    }

    #[test]
    fn test_unset_thresholds_never_breach() {
        assert_eq!(
            ThresholdEvaluator::classify(-99.0, None, None),
            BreachLevel::None
        );
        assert_eq!(
            ThresholdEvaluator::classify(40.0, None, Some(30.0)),
            BreachLevel::Critical
        );
    }

    #[test]
    fn test_no_data_point() {
        let indicator = on_time_delivery();
        let verdict = ThresholdEvaluator::new().evaluate(&indicator, None, Utc::now());

        assert_eq!(verdict.level, BreachLevel::None);
        assert!(!verdict.has_data());
        assert!(verdict.deviation_pct.is_none());
        assert_eq!(verdict.target_value, 95.0);
    }

    #[test]
    fn test_zero_target_is_undefined() {
        let indicator = IndicatorDefinition::new("DEF", "Defects", 0.0)
            .with_thresholds(Some(1.0), Some(2.0));
        let point = point_for(&indicator, 12.0);

        let verdict = ThresholdEvaluator::new().evaluate(&indicator, Some(&point), Utc::now());

        assert_eq!(verdict.level, BreachLevel::None);
        assert!(verdict.has_data());
        assert!(verdict.deviation_pct.is_none());
        assert!(deviation_pct(f64::NAN, 10.0).is_none());
    }

    proptest! {
        #[test]
        fn prop_level_is_symmetric_around_target(
            target in 1.0f64..10_000.0,
            offset_pct in 0.0f64..100.0,
        ) {
            let above = target * (1.0 + offset_pct / 100.0);
            let below = target * (1.0 - offset_pct / 100.0);
            let up = ThresholdEvaluator::classify(deviation_pct(above, target).unwrap(), Some(10.0), Some(30.0));
            let down = ThresholdEvaluator::classify(deviation_pct(below, target).unwrap(), Some(10.0), Some(30.0));
            // Away from the thresholds both directions must agree
            if (offset_pct - 10.0).abs() > 1e-6 && (offset_pct - 30.0).abs() > 1e-6 {
                prop_assert_eq!(up, down);
            }
        }

        #[test]
        fn prop_critical_implies_past_warning(deviation in -500.0f64..500.0) {
            let level = ThresholdEvaluator::classify(deviation, Some(8.0), Some(15.0));
            if level == BreachLevel::Critical {
                prop_assert!(deviation.abs() >= 8.0);
            }
            if deviation.abs() < 8.0 {
                prop_assert_eq!(level, BreachLevel::None);
            }
        }
    }
}
