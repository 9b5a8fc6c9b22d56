//! Dimension merge and weighted aggregation
//!
//! Combines the inference service's dimension map with the locally computed
//! behavioral deviation signal and produces the aggregate manipulation score.

use crate::inference::InferenceVerdict;
use mindwall_common::{AlertThresholds, Dimension, DimensionScores, Severity};

/// Blend weight of the behavioral engine when overriding the
/// sender-behavioral-deviation dimension; the inference value gets the rest.
const DEVIATION_BLEND: f64 = 0.6;

/// Merges dimension maps and computes aggregates.
pub struct ScoreAggregator {
    thresholds: AlertThresholds,
}

impl ScoreAggregator {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    /// Merge the inference scores with the behavioral deviation signal: a
    /// positive deviation score replaces `sender_behavioral_deviation` with
    /// a 60/40 blend of deviation and inference value. Every other
    /// dimension is the inference service's call.
    pub fn merge(&self, verdict: &InferenceVerdict, deviation_score: f64) -> DimensionScores {
        let mut scores = verdict.dimension_scores.clone();

        if deviation_score > 0.0 {
            let inferred = scores.get(Dimension::SenderBehavioralDeviation);
            let blended = deviation_score * DEVIATION_BLEND + inferred * (1.0 - DEVIATION_BLEND);
            scores.set(Dimension::SenderBehavioralDeviation, blended);
        }

        scores
    }

    /// Weighted aggregate of the twelve dimensions plus the pre-filter
    /// boost, clamped to [0, 100] at both steps.
    pub fn aggregate(&self, scores: &DimensionScores, prefilter_boost: f64) -> f64 {
        let weighted = scores.weighted_aggregate();
        (weighted + prefilter_boost).clamp(0.0, 100.0)
    }

    /// Severity for an aggregate score under the configured thresholds.
    pub fn severity(&self, aggregate: f64) -> Severity {
        Severity::from_score_with(aggregate, &self.thresholds)
    }

    /// Whether an aggregate score warrants an alert.
    pub fn alert_worthy(&self, aggregate: f64) -> bool {
        aggregate >= self.thresholds.medium
    }
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        Self::new(AlertThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn verdict_with(dim: Dimension, value: f64) -> InferenceVerdict {
        let mut scores = DimensionScores::zeroed();
        scores.set(dim, value);
        InferenceVerdict {
            dimension_scores: scores,
            primary_tactic: dim,
            explanation: String::new(),
            recommended_action: mindwall_common::RecommendedAction::Proceed,
            confidence: 50,
            raw_response: String::new(),
        }
    }

    #[test]
    fn test_deviation_blend() {
        let aggregator = ScoreAggregator::default();
        let verdict = verdict_with(Dimension::SenderBehavioralDeviation, 50.0);
        let merged = aggregator.merge(&verdict, 90.0);
        // 0.6 * 90 + 0.4 * 50 = 74
        assert!((merged.get(Dimension::SenderBehavioralDeviation) - 74.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_deviation_keeps_inference_value() {
        let aggregator = ScoreAggregator::default();
        let verdict = verdict_with(Dimension::SenderBehavioralDeviation, 50.0);
        let merged = aggregator.merge(&verdict, 0.0);
        assert_eq!(merged.get(Dimension::SenderBehavioralDeviation), 50.0);
    }

    #[test]
    fn test_merge_leaves_other_dimensions_untouched() {
        let aggregator = ScoreAggregator::default();
        let verdict = verdict_with(Dimension::CrossChannelCoordination, 30.0);
        let merged = aggregator.merge(&verdict, 85.0);
        assert_eq!(merged.get(Dimension::CrossChannelCoordination), 30.0);
    }

    #[test]
    fn test_aggregate_applies_boost_and_clamps() {
        let aggregator = ScoreAggregator::default();
        let mut scores = DimensionScores::zeroed();
        for dim in Dimension::ALL {
            scores.set(dim, 100.0);
        }
        assert_eq!(aggregator.aggregate(&scores, 25.0), 100.0);

        let scores = DimensionScores::zeroed();
        assert_eq!(aggregator.aggregate(&scores, 12.0), 12.0);
    }

    proptest! {
        #[test]
        fn test_aggregate_in_range(
            values in proptest::collection::vec(0.0f64..100.0, 12),
            boost in 0.0f64..60.0,
        ) {
            let aggregator = ScoreAggregator::default();
            let mut scores = DimensionScores::zeroed();
            for (dim, v) in Dimension::ALL.iter().zip(values) {
                scores.set(*dim, v);
            }
            let agg = aggregator.aggregate(&scores, boost);
            prop_assert!((0.0..=100.0).contains(&agg));
        }
    }
}
