//! Persisted record shapes
//!
//! These are the four logical tables behind the repository contracts:
//! employees, sender baselines, analyses, and alerts. All timestamps are UTC.

use crate::{Channel, DimensionScores, RecommendedAction, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uniqueness key of an analysis record: at most one analysis exists
/// per `(recipient, message_uid)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageFingerprint {
    pub recipient_email: String,
    pub message_uid: String,
}

impl MessageFingerprint {
    pub fn new(recipient_email: impl Into<String>, message_uid: impl Into<String>) -> Self {
        Self {
            recipient_email: recipient_email.into(),
            message_uid: message_uid.into(),
        }
    }
}

/// A completed analysis of one message. Append-only after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub fingerprint: MessageFingerprint,
    pub sender_email: String,
    pub sender_display_name: String,
    pub subject: String,
    pub channel: Channel,
    pub received_at: Option<DateTime<Utc>>,
    pub analyzed_at: DateTime<Utc>,
    pub prefilter_triggered: bool,
    pub prefilter_signals: Vec<String>,
    pub manipulation_score: f64,
    pub dimension_scores: DimensionScores,
    pub explanation: String,
    pub recommended_action: RecommendedAction,
    pub inference_raw_response: String,
    pub processing_time_ms: u64,
}

/// An alert raised for an analysis whose aggregate crossed the medium
/// threshold. Owned by exactly one analysis; mutated once on acknowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub analysis_id: i64,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Key of a sender baseline: the `(recipient, sender)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaselineKey {
    pub recipient_email: String,
    pub sender_email: String,
}

impl BaselineKey {
    pub fn new(recipient_email: impl Into<String>, sender_email: impl Into<String>) -> Self {
        Self {
            recipient_email: recipient_email.into(),
            sender_email: sender_email.into(),
        }
    }
}

/// Per-(recipient, sender) behavioral profile, updated online with an
/// exponential moving average on each observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderBaseline {
    pub key: BaselineKey,
    pub avg_word_count: f64,
    pub avg_sentence_length: f64,
    /// Hours (UTC, 0-23) this sender typically sends at, most recently
    /// added last, bounded to 8 entries.
    pub typical_hours: Vec<u8>,
    /// 0.0 = very informal, 1.0 = very formal.
    pub formality_score: f64,
    pub sample_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// A protected employee (recipient). Carries a rolling 30-day risk score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub email: String,
    pub display_name: Option<String>,
    pub risk_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_equality() {
        let a = MessageFingerprint::new("bob@corp.com", "42");
        let b = MessageFingerprint::new("bob@corp.com", "42");
        let c = MessageFingerprint::new("bob@corp.com", "43");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_analysis_record_serde_round_trip() {
        let record = AnalysisRecord {
            id: 1,
            fingerprint: MessageFingerprint::new("bob@corp.com", "42"),
            sender_email: "alice@corp.com".into(),
            sender_display_name: "Alice".into(),
            subject: "Q4 numbers".into(),
            channel: Channel::Retrieval,
            received_at: None,
            analyzed_at: Utc::now(),
            prefilter_triggered: false,
            prefilter_signals: vec![],
            manipulation_score: 12.5,
            dimension_scores: DimensionScores::zeroed(),
            explanation: "No manipulation detected.".into(),
            recommended_action: RecommendedAction::Proceed,
            inference_raw_response: "{}".into(),
            processing_time_ms: 120,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: AnalysisRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.fingerprint, record.fingerprint);
        assert_eq!(back.manipulation_score, record.manipulation_score);
    }
}
