//! Analysis API client
//!
//! Submits extracted message text to the MindWall analysis API and caches
//! the returned verdicts per message uid for subject annotation. Submission
//! is fire-and-forget; a failed analysis never disturbs the relay.

use crate::error::{ProxyError, ProxyResult};
use crate::imap::interceptor::CachedVerdict;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use mindwall_common::Severity;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Bodies are truncated to this many characters before submission.
const SUBMIT_BODY_LIMIT: usize = 8000;

/// Sanitized bodies at or below this length are not worth analyzing.
const MIN_BODY_CHARS: usize = 20;

/// Wire payload for POST /api/analyze.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSubmission {
    pub message_uid: String,
    pub recipient_email: String,
    pub sender_email: String,
    pub sender_display_name: String,
    pub subject: String,
    pub body: String,
    pub channel: &'static str,
    pub received_at: Option<DateTime<Utc>>,
}

/// The fields of the analysis response the proxy cares about.
#[derive(Debug, Deserialize)]
struct VerdictResponse {
    manipulation_score: f64,
    severity: Severity,
}

/// HTTP client for the analysis API plus the per-uid verdict cache.
pub struct AnalysisClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    verdicts: Arc<DashMap<String, CachedVerdict>>,
    in_flight: DashSet<String>,
}

impl AnalysisClient {
    pub fn new(base_url: &str, secret_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(35))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            verdicts: Arc::new(DashMap::new()),
            in_flight: DashSet::new(),
        }
    }

    /// Shared verdict cache handed to each session's interceptor.
    pub fn verdicts(&self) -> Arc<DashMap<String, CachedVerdict>> {
        self.verdicts.clone()
    }

    /// Whether this uid is worth submitting: body long enough, no verdict
    /// cached, no submission already in flight.
    pub fn should_submit(&self, uid: &str, sanitized_body: &str) -> bool {
        sanitized_body.trim().len() > MIN_BODY_CHARS
            && !self.verdicts.contains_key(uid)
            && !self.in_flight.contains(uid)
    }

    /// Submit in the background; errors are logged and swallowed.
    pub fn submit_background(client: &Arc<Self>, mut submission: AnalysisSubmission) {
        if !client.in_flight.insert(submission.message_uid.clone()) {
            return;
        }
        submission.body = submission.body.chars().take(SUBMIT_BODY_LIMIT).collect();

        let client = client.clone();
        tokio::spawn(async move {
            let uid = submission.message_uid.clone();
            match client.submit(submission).await {
                Ok(verdict) => {
                    tracing::info!(
                        uid = %uid,
                        score = verdict.score,
                        severity = %verdict.severity,
                        "interceptor.analysis_complete"
                    );
                }
                Err(e) => {
                    tracing::warn!(uid = %uid, error = %e, "interceptor.analysis_failed");
                }
            }
            client.in_flight.remove(&uid);
        });
    }

    /// Submit one message and cache the verdict.
    pub async fn submit(&self, submission: AnalysisSubmission) -> ProxyResult<CachedVerdict> {
        let uid = submission.message_uid.clone();
        let response = self
            .http
            .post(format!("{}/api/analyze", self.base_url))
            .header("X-MindWall-Key", &self.secret_key)
            .json(&submission)
            .send()
            .await
            .map_err(|e| ProxyError::Api(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::Api(format!("analysis returned HTTP {}", status)));
        }

        let body: VerdictResponse = response
            .json()
            .await
            .map_err(|e| ProxyError::Api(e.to_string()))?;

        let verdict = CachedVerdict {
            score: body.manipulation_score,
            severity: body.severity,
        };
        self.verdicts.insert(uid, verdict);
        Ok(verdict)
    }

    /// Poll the cache for a verdict, bounded by `wait`. Used by the
    /// hold-for-verdict annotation policy.
    pub async fn await_verdict(&self, uid: &str, wait: Duration) -> Option<CachedVerdict> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(verdict) = self.verdicts.get(uid) {
                return Some(*verdict);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}
