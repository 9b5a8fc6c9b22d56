//! In-memory repository implementations
//!
//! `DashMap`-backed stores satisfying the repository contracts. These are the
//! stores the binaries run with; swapping in a SQL-backed implementation only
//! means re-implementing the traits.

use crate::repository::{
    AlertRepository, AnalysisInsert, AnalysisRepository, BaselineRepository, EmployeeRepository,
    RepoError, RepoResult, SummaryStats, UnacknowledgedCounts,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use mindwall_common::{
    AlertRecord, AnalysisRecord, BaselineKey, EmployeeRecord, SenderBaseline, Severity,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// In-memory analysis store with a fingerprint uniqueness index.
#[derive(Default)]
pub struct MemoryAnalysisRepository {
    records: DashMap<i64, AnalysisRecord>,
    by_fingerprint: DashMap<(String, String), i64>,
    next_id: AtomicI64,
}

impl MemoryAnalysisRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn fingerprint_key(recipient: &str, uid: &str) -> (String, String) {
        (recipient.to_string(), uid.to_string())
    }
}

#[async_trait]
impl AnalysisRepository for MemoryAnalysisRepository {
    async fn insert(&self, insert: AnalysisInsert) -> RepoResult<(AnalysisRecord, bool)> {
        let key = Self::fingerprint_key(
            &insert.fingerprint.recipient_email,
            &insert.fingerprint.message_uid,
        );

        // The entry guard makes the check-then-insert atomic per fingerprint.
        match self.by_fingerprint.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                let id = *existing.get();
                self.records
                    .get(&id)
                    .map(|r| (r.clone(), false))
                    .ok_or_else(|| RepoError::Unavailable(format!("dangling analysis id {}", id)))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let record = AnalysisRecord {
                    id,
                    fingerprint: insert.fingerprint,
                    sender_email: insert.sender_email,
                    sender_display_name: insert.sender_display_name,
                    subject: insert.subject,
                    channel: insert.channel,
                    received_at: insert.received_at,
                    analyzed_at: Utc::now(),
                    prefilter_triggered: insert.prefilter_triggered,
                    prefilter_signals: insert.prefilter_signals,
                    manipulation_score: insert.manipulation_score,
                    dimension_scores: insert.dimension_scores,
                    explanation: insert.explanation,
                    recommended_action: insert.recommended_action,
                    inference_raw_response: insert.inference_raw_response,
                    processing_time_ms: insert.processing_time_ms,
                };
                self.records.insert(id, record.clone());
                slot.insert(id);
                Ok((record, true))
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<AnalysisRecord>> {
        Ok(self.records.get(&id).map(|r| r.clone()))
    }

    async fn recent_by_sender_recipient(
        &self,
        recipient_email: &str,
        sender_email: &str,
        since: DateTime<Utc>,
    ) -> RepoResult<Vec<AnalysisRecord>> {
        let mut matches: Vec<AnalysisRecord> = self
            .records
            .iter()
            .filter(|r| {
                r.fingerprint.recipient_email == recipient_email
                    && r.sender_email == sender_email
                    && r.analyzed_at >= since
            })
            .map(|r| r.clone())
            .collect();
        matches.sort_by_key(|r| r.analyzed_at);
        Ok(matches)
    }

    async fn recent_by_recipient(
        &self,
        recipient_email: &str,
        since: DateTime<Utc>,
    ) -> RepoResult<Vec<AnalysisRecord>> {
        let mut matches: Vec<AnalysisRecord> = self
            .records
            .iter()
            .filter(|r| r.fingerprint.recipient_email == recipient_email && r.analyzed_at >= since)
            .map(|r| r.clone())
            .collect();
        matches.sort_by_key(|r| r.analyzed_at);
        Ok(matches)
    }

    async fn summary_stats(&self) -> RepoResult<SummaryStats> {
        let total = self.records.len() as u64;
        if total == 0 {
            return Ok(SummaryStats {
                total_analyses: 0,
                average_score: 0.0,
                high_risk_count: 0,
                critical_count: 0,
                average_processing_ms: 0.0,
            });
        }
        let mut score_sum = 0.0;
        let mut time_sum = 0.0;
        let mut high = 0;
        let mut critical = 0;
        for r in self.records.iter() {
            score_sum += r.manipulation_score;
            time_sum += r.processing_time_ms as f64;
            if r.manipulation_score >= 60.0 {
                high += 1;
            }
            if r.manipulation_score >= 80.0 {
                critical += 1;
            }
        }
        Ok(SummaryStats {
            total_analyses: total,
            average_score: score_sum / total as f64,
            high_risk_count: high,
            critical_count: critical,
            average_processing_ms: time_sum / total as f64,
        })
    }
}

/// In-memory alert store.
#[derive(Default)]
pub struct MemoryAlertRepository {
    alerts: DashMap<i64, AlertRecord>,
    next_id: AtomicI64,
}

impl MemoryAlertRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn insert(&self, analysis_id: i64, severity: Severity) -> RepoResult<AlertRecord> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let alert = AlertRecord {
            id,
            analysis_id,
            severity,
            created_at: Utc::now(),
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
        };
        self.alerts.insert(id, alert.clone());
        Ok(alert)
    }

    async fn get_by_id(&self, alert_id: i64) -> RepoResult<Option<AlertRecord>> {
        Ok(self.alerts.get(&alert_id).map(|a| a.clone()))
    }

    async fn acknowledge(
        &self,
        alert_id: i64,
        acknowledged_by: &str,
    ) -> RepoResult<AlertRecord> {
        let mut alert = self
            .alerts
            .get_mut(&alert_id)
            .ok_or_else(|| RepoError::NotFound(format!("alert {}", alert_id)))?;
        if !alert.acknowledged {
            alert.acknowledged = true;
            alert.acknowledged_by = Some(acknowledged_by.to_string());
            alert.acknowledged_at = Some(Utc::now());
        }
        Ok(alert.clone())
    }

    async fn unacknowledged_counts(&self) -> RepoResult<UnacknowledgedCounts> {
        let mut counts = UnacknowledgedCounts::default();
        for a in self.alerts.iter().filter(|a| !a.acknowledged) {
            match a.severity {
                Severity::Low => counts.low += 1,
                Severity::Medium => counts.medium += 1,
                Severity::High => counts.high += 1,
                Severity::Critical => counts.critical += 1,
            }
        }
        Ok(counts)
    }
}

/// In-memory sender baseline store.
#[derive(Default)]
pub struct MemoryBaselineRepository {
    baselines: DashMap<BaselineKey, SenderBaseline>,
}

impl MemoryBaselineRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BaselineRepository for MemoryBaselineRepository {
    async fn get(&self, key: &BaselineKey) -> RepoResult<Option<SenderBaseline>> {
        Ok(self.baselines.get(key).map(|b| b.clone()))
    }

    async fn upsert(&self, baseline: SenderBaseline) -> RepoResult<()> {
        self.baselines.insert(baseline.key.clone(), baseline);
        Ok(())
    }
}

/// In-memory employee store. Holds the analysis store so risk profiles can
/// read the recipient's recent history.
pub struct MemoryEmployeeRepository {
    employees: DashMap<String, EmployeeRecord>,
    analyses: Arc<dyn AnalysisRepository>,
}

impl MemoryEmployeeRepository {
    pub fn new(analyses: Arc<dyn AnalysisRepository>) -> Self {
        Self {
            employees: DashMap::new(),
            analyses,
        }
    }
}

#[async_trait]
impl EmployeeRepository for MemoryEmployeeRepository {
    async fn get_or_create(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> RepoResult<EmployeeRecord> {
        let entry = self
            .employees
            .entry(email.to_string())
            .or_insert_with(|| EmployeeRecord {
                email: email.to_string(),
                display_name: display_name.map(|s| s.to_string()),
                risk_score: 0.0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            });
        Ok(entry.clone())
    }

    async fn get(&self, email: &str) -> RepoResult<Option<EmployeeRecord>> {
        Ok(self.employees.get(email).map(|e| e.clone()))
    }

    async fn update_risk_score(&self, email: &str, risk_score: f64) -> RepoResult<()> {
        let mut employee = self
            .employees
            .get_mut(email)
            .ok_or_else(|| RepoError::NotFound(format!("employee {}", email)))?;
        employee.risk_score = risk_score;
        employee.updated_at = Utc::now();
        Ok(())
    }

    async fn risk_profile(
        &self,
        email: &str,
    ) -> RepoResult<(EmployeeRecord, Vec<AnalysisRecord>)> {
        let since = Utc::now() - Duration::days(30);
        let recent = self.analyses.recent_by_recipient(email, since).await?;

        let mut employee = self
            .employees
            .get_mut(email)
            .ok_or_else(|| RepoError::NotFound(format!("employee {}", email)))?;
        if !recent.is_empty() {
            let avg = recent.iter().map(|r| r.manipulation_score).sum::<f64>()
                / recent.len() as f64;
            employee.risk_score = (avg * 100.0).round() / 100.0;
            employee.updated_at = Utc::now();
        }
        Ok((employee.clone(), recent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindwall_common::{Channel, DimensionScores, MessageFingerprint, RecommendedAction};

    fn sample_insert(uid: &str) -> AnalysisInsert {
        AnalysisInsert {
            fingerprint: MessageFingerprint::new("bob@corp.com", uid),
            sender_email: "alice@corp.com".into(),
            sender_display_name: "Alice".into(),
            subject: "hello".into(),
            channel: Channel::Retrieval,
            received_at: None,
            prefilter_triggered: false,
            prefilter_signals: vec![],
            manipulation_score: 10.0,
            dimension_scores: DimensionScores::zeroed(),
            explanation: String::new(),
            recommended_action: RecommendedAction::Proceed,
            inference_raw_response: "{}".into(),
            processing_time_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_insert_is_unique_per_fingerprint() {
        let repo = MemoryAnalysisRepository::new();
        let (first, created) = repo.insert(sample_insert("42")).await.unwrap();
        assert!(created);
        let (second, created) = repo.insert(sample_insert("42")).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        let (other, _) = repo.insert(sample_insert("43")).await.unwrap();
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn test_acknowledge_mutates_once() {
        let repo = MemoryAlertRepository::new();
        let alert = repo.insert(7, Severity::High).await.unwrap();
        assert!(!alert.acknowledged);

        let acked = repo.acknowledge(alert.id, "analyst@corp.com").await.unwrap();
        assert!(acked.acknowledged);
        let first_time = acked.acknowledged_at;

        let again = repo.acknowledge(alert.id, "someone-else").await.unwrap();
        assert_eq!(again.acknowledged_by.as_deref(), Some("analyst@corp.com"));
        assert_eq!(again.acknowledged_at, first_time);
    }

    #[tokio::test]
    async fn test_unacknowledged_counts() {
        let repo = MemoryAlertRepository::new();
        repo.insert(1, Severity::High).await.unwrap();
        repo.insert(2, Severity::High).await.unwrap();
        let medium = repo.insert(3, Severity::Medium).await.unwrap();
        repo.acknowledge(medium.id, "a").await.unwrap();

        let counts = repo.unacknowledged_counts().await.unwrap();
        assert_eq!(counts.high, 2);
        assert_eq!(counts.medium, 0);
    }

    #[tokio::test]
    async fn test_employee_get_or_create_idempotent() {
        let repo = MemoryEmployeeRepository::new(Arc::new(MemoryAnalysisRepository::new()));
        let a = repo.get_or_create("bob@corp.com", Some("Bob")).await.unwrap();
        let b = repo.get_or_create("bob@corp.com", None).await.unwrap();
        assert_eq!(a.email, b.email);
        assert_eq!(b.display_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn test_risk_profile_reads_window_and_updates_score() {
        let analyses = Arc::new(MemoryAnalysisRepository::new());
        let mut high = sample_insert("1");
        high.manipulation_score = 70.0;
        analyses.insert(high).await.unwrap();
        let mut low = sample_insert("2");
        low.manipulation_score = 30.0;
        analyses.insert(low).await.unwrap();

        let repo = MemoryEmployeeRepository::new(analyses);
        repo.get_or_create("bob@corp.com", None).await.unwrap();

        let (employee, recent) = repo.risk_profile("bob@corp.com").await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(employee.risk_score, 50.0);

        let stored = repo.get("bob@corp.com").await.unwrap().unwrap();
        assert_eq!(stored.risk_score, 50.0);
    }

    #[tokio::test]
    async fn test_risk_profile_unknown_employee() {
        let repo = MemoryEmployeeRepository::new(Arc::new(MemoryAnalysisRepository::new()));
        assert!(repo.risk_profile("ghost@corp.com").await.is_err());
    }

    #[tokio::test]
    async fn test_summary_stats() {
        let repo = MemoryAnalysisRepository::new();
        let mut high = sample_insert("1");
        high.manipulation_score = 85.0;
        repo.insert(high).await.unwrap();
        repo.insert(sample_insert("2")).await.unwrap();

        let stats = repo.summary_stats().await.unwrap();
        assert_eq!(stats.total_analyses, 2);
        assert_eq!(stats.high_risk_count, 1);
        assert_eq!(stats.critical_count, 1);
        assert!((stats.average_score - 47.5).abs() < 1e-9);
    }
}
