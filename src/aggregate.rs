//! Aggregation strategies.
//!
//! Pure reduction of a set of risk values to one number. The weighted method
//! classifies each value against the configured thresholds and weighs it by
//! its own level; callers aggregating inherent and residual figures run the
//! classification separately for each figure.

use crate::config::{AggregationConfig, AggregationMethod};
use crate::types::RiskLevel;

/// Reduce a set of risk values to one number with the configured method.
/// An empty input aggregates to 0 under every method.
pub fn aggregate(values: &[f64], config: &AggregationConfig) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    match config.method {
        AggregationMethod::Average => values.iter().sum::<f64>() / values.len() as f64,
        AggregationMethod::WorstCase => values.iter().copied().fold(f64::MIN, f64::max),
        AggregationMethod::Weighted => {
            let mut numerator = 0.0;
            let mut denominator = 0u64;
            for &value in values {
                let level = RiskLevel::classify(value, &config.thresholds);
                let weight = config.weights.weight_for(level);
                numerator += value * f64::from(weight);
                denominator += u64::from(weight);
            }
            if denominator == 0 {
                // All participating weights are zero; nothing to divide by
                0.0
            } else {
                numerator / denominator as f64
            }
        }
    }
}
