//! Persistence contracts
//!
//! The engine talks to storage exclusively through these traits; the
//! concrete store is an implementation detail. `memory` provides the
//! in-process implementation used by the binaries and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mindwall_common::{
    AlertRecord, AnalysisRecord, BaselineKey, Channel, DimensionScores, EmployeeRecord,
    MessageFingerprint, RecommendedAction, SenderBaseline, Severity,
};
use thiserror::Error;

/// Errors surfaced by a repository.
#[derive(Error, Debug)]
pub enum RepoError {
    /// Backing store unreachable or failed the operation
    #[error("persistence unavailable: {0}")]
    Unavailable(String),

    /// Referenced record does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Fields of a new analysis record; id and analyzed-at are assigned on insert.
#[derive(Debug, Clone)]
pub struct AnalysisInsert {
    pub fingerprint: MessageFingerprint,
    pub sender_email: String,
    pub sender_display_name: String,
    pub subject: String,
    pub channel: Channel,
    pub received_at: Option<DateTime<Utc>>,
    pub prefilter_triggered: bool,
    pub prefilter_signals: Vec<String>,
    pub manipulation_score: f64,
    pub dimension_scores: DimensionScores,
    pub explanation: String,
    pub recommended_action: RecommendedAction,
    pub inference_raw_response: String,
    pub processing_time_ms: u64,
}

/// Aggregate statistics over all analyses.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SummaryStats {
    pub total_analyses: u64,
    pub average_score: f64,
    pub high_risk_count: u64,
    pub critical_count: u64,
    pub average_processing_ms: f64,
}

/// Store of analysis records, unique per `(message_uid, recipient)`.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Insert a record. On a fingerprint conflict the existing record is
    /// returned unchanged with `created == false`; the store never holds two
    /// records for one fingerprint.
    async fn insert(&self, insert: AnalysisInsert) -> RepoResult<(AnalysisRecord, bool)>;

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<AnalysisRecord>>;

    /// Analyses for a `(recipient, sender)` pair analyzed at or after
    /// `since`, ordered by analyzed-at ascending.
    async fn recent_by_sender_recipient(
        &self,
        recipient_email: &str,
        sender_email: &str,
        since: DateTime<Utc>,
    ) -> RepoResult<Vec<AnalysisRecord>>;

    /// Analyses targeting a recipient analyzed at or after `since`,
    /// ordered by analyzed-at ascending.
    async fn recent_by_recipient(
        &self,
        recipient_email: &str,
        since: DateTime<Utc>,
    ) -> RepoResult<Vec<AnalysisRecord>>;

    async fn summary_stats(&self) -> RepoResult<SummaryStats>;
}

/// Per-severity counts of unacknowledged alerts.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct UnacknowledgedCounts {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub critical: u64,
}

/// Store of alerts. Each alert belongs to exactly one analysis and is
/// mutated at most once, on acknowledgement.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn insert(&self, analysis_id: i64, severity: Severity) -> RepoResult<AlertRecord>;

    async fn get_by_id(&self, alert_id: i64) -> RepoResult<Option<AlertRecord>>;

    /// Acknowledge an alert. Idempotent: an already-acknowledged alert is
    /// returned unchanged.
    async fn acknowledge(&self, alert_id: i64, acknowledged_by: &str)
        -> RepoResult<AlertRecord>;

    async fn unacknowledged_counts(&self) -> RepoResult<UnacknowledgedCounts>;
}

/// Store of sender baselines, unique per `(recipient, sender)`.
#[async_trait]
pub trait BaselineRepository: Send + Sync {
    async fn get(&self, key: &BaselineKey) -> RepoResult<Option<SenderBaseline>>;

    async fn upsert(&self, baseline: SenderBaseline) -> RepoResult<()>;
}

/// Store of employee records, keyed by recipient email.
#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn get_or_create(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> RepoResult<EmployeeRecord>;

    async fn get(&self, email: &str) -> RepoResult<Option<EmployeeRecord>>;

    /// Update the rolling risk score, stamping updated-at.
    async fn update_risk_score(&self, email: &str, risk_score: f64) -> RepoResult<()>;

    /// The employee plus their analyses from the last 30 days, oldest
    /// first. As a side effect the rolling risk score is recomputed over
    /// that window and stored on the record.
    async fn risk_profile(
        &self,
        email: &str,
    ) -> RepoResult<(EmployeeRecord, Vec<AnalysisRecord>)>;
}
