//! Severity, recommended action, and ingest channel enums

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity derived from the aggregate manipulation score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Score thresholds mapping an aggregate score to a severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// At or above this score an alert is created.
    pub medium: f64,
    /// At or above this score the alert is high severity.
    pub high: f64,
    /// At or above this score the alert is critical.
    pub critical: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            medium: 35.0,
            high: 60.0,
            critical: 80.0,
        }
    }
}

impl Severity {
    /// Map an aggregate score to a severity with the default thresholds.
    pub fn from_score(score: f64) -> Self {
        Self::from_score_with(score, &AlertThresholds::default())
    }

    /// Map an aggregate score to a severity with configured thresholds.
    pub fn from_score_with(score: f64, thresholds: &AlertThresholds) -> Self {
        if score >= thresholds.critical {
            Severity::Critical
        } else if score >= thresholds.high {
            Severity::High
        } else if score >= thresholds.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the recipient should do with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Proceed,
    Verify,
    Block,
}

impl RecommendedAction {
    /// Parse the inference service's action string; anything unknown
    /// degrades to `Verify`.
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "proceed" => RecommendedAction::Proceed,
            "block" => RecommendedAction::Block,
            _ => RecommendedAction::Verify,
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Proceed => "proceed",
            RecommendedAction::Verify => "verify",
            RecommendedAction::Block => "block",
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ingest source of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Intercepted on the mail-retrieval path.
    #[serde(rename = "imap")]
    Retrieval,
    /// Submitted from a browser-origin client.
    #[serde(rename = "gmail_web")]
    Web,
}

impl Channel {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Retrieval => "imap",
            Channel::Web => "gmail_web",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_severity_boundaries() {
        assert_eq!(Severity::from_score(0.0), Severity::Low);
        assert_eq!(Severity::from_score(34.99), Severity::Low);
        assert_eq!(Severity::from_score(35.0), Severity::Medium);
        assert_eq!(Severity::from_score(60.0), Severity::High);
        assert_eq!(Severity::from_score(80.0), Severity::Critical);
        assert_eq!(Severity::from_score(100.0), Severity::Critical);
    }

    #[test]
    fn test_action_parse_lenient() {
        assert_eq!(
            RecommendedAction::parse_lenient("proceed"),
            RecommendedAction::Proceed
        );
        assert_eq!(
            RecommendedAction::parse_lenient("block"),
            RecommendedAction::Block
        );
        assert_eq!(
            RecommendedAction::parse_lenient("escalate"),
            RecommendedAction::Verify
        );
    }

    #[test]
    fn test_channel_wire_names() {
        assert_eq!(
            serde_json::to_string(&Channel::Retrieval).unwrap(),
            "\"imap\""
        );
        assert_eq!(
            serde_json::from_str::<Channel>("\"gmail_web\"").unwrap(),
            Channel::Web
        );
    }

    proptest! {
        #[test]
        fn test_severity_monotone(a in 0.0f64..100.0, b in 0.0f64..100.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(Severity::from_score(lo) <= Severity::from_score(hi));
        }
    }
}
