//! # Threshold Evaluation
//!
//! Pure evaluation of an indicator's latest data point against its target and
//! percentage thresholds.

pub mod threshold_evaluator;

pub use threshold_evaluator::{deviation_pct, ThresholdEvaluator};
