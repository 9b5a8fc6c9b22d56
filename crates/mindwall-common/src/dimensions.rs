//! The 12-dimension manipulation scoring framework
//!
//! Every analyzed message is scored on a closed set of twelve psychological
//! manipulation axes. The weighted sum of the per-dimension scores, plus any
//! pre-filter boost, yields the aggregate manipulation score.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The twelve psychological manipulation dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    ArtificialUrgency,
    AuthorityImpersonation,
    FearThreatInduction,
    ReciprocityExploitation,
    ScarcityTactics,
    SocialProofManipulation,
    SenderBehavioralDeviation,
    CrossChannelCoordination,
    EmotionalEscalation,
    RequestContextMismatch,
    UnusualActionRequested,
    TimingAnomaly,
}

impl Dimension {
    /// All dimensions in canonical order.
    pub const ALL: [Dimension; 12] = [
        Dimension::ArtificialUrgency,
        Dimension::AuthorityImpersonation,
        Dimension::FearThreatInduction,
        Dimension::ReciprocityExploitation,
        Dimension::ScarcityTactics,
        Dimension::SocialProofManipulation,
        Dimension::SenderBehavioralDeviation,
        Dimension::CrossChannelCoordination,
        Dimension::EmotionalEscalation,
        Dimension::RequestContextMismatch,
        Dimension::UnusualActionRequested,
        Dimension::TimingAnomaly,
    ];

    /// Aggregation weight. The twelve weights sum to 1.00.
    pub fn weight(&self) -> f64 {
        match self {
            Dimension::ArtificialUrgency => 0.12,
            Dimension::AuthorityImpersonation => 0.15,
            Dimension::FearThreatInduction => 0.12,
            Dimension::ReciprocityExploitation => 0.07,
            Dimension::ScarcityTactics => 0.07,
            Dimension::SocialProofManipulation => 0.06,
            Dimension::SenderBehavioralDeviation => 0.12,
            Dimension::CrossChannelCoordination => 0.08,
            Dimension::EmotionalEscalation => 0.07,
            Dimension::RequestContextMismatch => 0.06,
            Dimension::UnusualActionRequested => 0.05,
            Dimension::TimingAnomaly => 0.03,
        }
    }

    /// Wire name of the dimension (snake_case, as the inference service emits it).
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::ArtificialUrgency => "artificial_urgency",
            Dimension::AuthorityImpersonation => "authority_impersonation",
            Dimension::FearThreatInduction => "fear_threat_induction",
            Dimension::ReciprocityExploitation => "reciprocity_exploitation",
            Dimension::ScarcityTactics => "scarcity_tactics",
            Dimension::SocialProofManipulation => "social_proof_manipulation",
            Dimension::SenderBehavioralDeviation => "sender_behavioral_deviation",
            Dimension::CrossChannelCoordination => "cross_channel_coordination",
            Dimension::EmotionalEscalation => "emotional_escalation",
            Dimension::RequestContextMismatch => "request_context_mismatch",
            Dimension::UnusualActionRequested => "unusual_action_requested",
            Dimension::TimingAnomaly => "timing_anomaly",
        }
    }

    /// Parse a wire name back into a dimension.
    pub fn from_str_opt(name: &str) -> Option<Dimension> {
        Dimension::ALL.iter().copied().find(|d| d.as_str() == name)
    }

    /// Human-readable description, used when assembling the inference prompt.
    pub fn description(&self) -> &'static str {
        match self {
            Dimension::ArtificialUrgency => {
                "manufactured time pressure or deadline designed to rush decision-making"
            }
            Dimension::AuthorityImpersonation => {
                "falsely claiming or implying authority, rank, or official capacity"
            }
            Dimension::FearThreatInduction => {
                "using threats, consequences, or fear to compel action"
            }
            Dimension::ReciprocityExploitation => {
                "leveraging past favors, gifts, or obligations to compel compliance"
            }
            Dimension::ScarcityTactics => {
                "creating false scarcity of time, resource, or opportunity"
            }
            Dimension::SocialProofManipulation => {
                "fabricating consensus, peer behavior, or social validation"
            }
            Dimension::SenderBehavioralDeviation => {
                "deviation from this sender's typical communication style"
            }
            Dimension::CrossChannelCoordination => {
                "evidence of coordinated multi-channel social engineering attack"
            }
            Dimension::EmotionalEscalation => {
                "escalating emotional intensity to override rational thinking"
            }
            Dimension::RequestContextMismatch => {
                "the request is inconsistent with the stated context or relationship"
            }
            Dimension::UnusualActionRequested => {
                "requesting actions atypical for legitimate business communication"
            }
            Dimension::TimingAnomaly => {
                "suspicious timing relative to sender's typical communication patterns"
            }
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete map of the twelve dimension scores, each in [0, 100].
///
/// Construction always yields all twelve keys; absent inputs default to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores(BTreeMap<Dimension, f64>);

impl DimensionScores {
    /// All twelve dimensions at zero.
    pub fn zeroed() -> Self {
        Self(Dimension::ALL.iter().map(|d| (*d, 0.0)).collect())
    }

    /// Build from raw `(name, value)` pairs. Unknown names are dropped,
    /// missing dimensions default to 0, values are clamped to [0, 100].
    pub fn from_raw<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut scores = Self::zeroed();
        for (name, value) in pairs {
            if let Some(dim) = Dimension::from_str_opt(name) {
                scores.set(dim, value);
            }
        }
        scores
    }

    /// Score for one dimension.
    pub fn get(&self, dim: Dimension) -> f64 {
        self.0.get(&dim).copied().unwrap_or(0.0)
    }

    /// Set one dimension, clamping into [0, 100].
    pub fn set(&mut self, dim: Dimension, value: f64) {
        self.0.insert(dim, value.clamp(0.0, 100.0));
    }

    /// Weighted sum of all dimensions, clamped to [0, 100].
    pub fn weighted_aggregate(&self) -> f64 {
        let sum: f64 = Dimension::ALL
            .iter()
            .map(|d| self.get(*d) * d.weight())
            .sum();
        sum.clamp(0.0, 100.0)
    }

    /// Highest-scoring dimension (canonical order breaks ties).
    pub fn primary_tactic(&self) -> Dimension {
        let mut best = Dimension::ArtificialUrgency;
        let mut best_score = f64::MIN;
        for dim in Dimension::ALL {
            let s = self.get(dim);
            if s > best_score {
                best = dim;
                best_score = s;
            }
        }
        best
    }

    /// Iterate `(dimension, score)` in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        Dimension::ALL.iter().map(move |d| (*d, self.get(*d)))
    }
}

impl Default for DimensionScores {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_weights_sum_to_one() {
        let sum: f64 = Dimension::ALL.iter().map(|d| d.weight()).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_wire_names_round_trip() {
        for dim in Dimension::ALL {
            assert_eq!(Dimension::from_str_opt(dim.as_str()), Some(dim));
        }
    }

    #[test]
    fn test_from_raw_defaults_and_clamps() {
        let scores = DimensionScores::from_raw(vec![
            ("artificial_urgency", 150.0),
            ("fear_threat_induction", -10.0),
            ("not_a_dimension", 50.0),
        ]);
        assert_eq!(scores.get(Dimension::ArtificialUrgency), 100.0);
        assert_eq!(scores.get(Dimension::FearThreatInduction), 0.0);
        assert_eq!(scores.get(Dimension::AuthorityImpersonation), 0.0);
        assert_eq!(scores.iter().count(), 12);
    }

    #[test]
    fn test_serde_uses_snake_case_keys() {
        let mut scores = DimensionScores::zeroed();
        scores.set(Dimension::AuthorityImpersonation, 45.0);
        let json = serde_json::to_value(&scores).unwrap();
        assert_eq!(json["authority_impersonation"], 45.0);
        assert_eq!(json.as_object().unwrap().len(), 12);
    }

    #[test]
    fn test_primary_tactic_prefers_highest() {
        let mut scores = DimensionScores::zeroed();
        scores.set(Dimension::ScarcityTactics, 60.0);
        scores.set(Dimension::FearThreatInduction, 80.0);
        assert_eq!(scores.primary_tactic(), Dimension::FearThreatInduction);
    }

    proptest! {
        #[test]
        fn test_aggregate_always_in_range(values in proptest::collection::vec(-50.0f64..200.0, 12)) {
            let mut scores = DimensionScores::zeroed();
            for (dim, v) in Dimension::ALL.iter().zip(values) {
                scores.set(*dim, v);
            }
            let agg = scores.weighted_aggregate();
            prop_assert!((0.0..=100.0).contains(&agg));
        }
    }
}
