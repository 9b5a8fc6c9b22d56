//! Analysis pipeline orchestrator
//!
//! Runs the full staged analysis for one message: pre-filter, baseline
//! lookup, deviation scoring, inference, merge and aggregation,
//! persistence, alerting, broadcast, and the fire-and-forget baseline
//! update. Inference failures divert to a rule-based fallback and the
//! pipeline completes normally.

use crate::baseline::{BaselineEngine, BaselineMailbox, BaselineUpdate};
use crate::broadcast::{AlertEvent, AlertHub};
use crate::deviation::DeviationScorer;
use crate::inference::{InferenceClient, InferenceVerdict};
use crate::prefilter::{PreFilter, PreFilterResult};
use crate::prompt::{build_analysis_prompt, SYSTEM_PROMPT};
use crate::repository::{AlertRepository, AnalysisInsert, AnalysisRepository, RepoResult};
use crate::scorer::ScoreAggregator;
use crate::text_metrics::body_metrics;
use chrono::{DateTime, Timelike, Utc};
use mindwall_common::{
    AlertThresholds, BaselineKey, Channel, Dimension, DimensionScores, MessageFingerprint,
    RecommendedAction, Severity,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// One message submitted for analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub message_uid: String,
    pub recipient_email: String,
    pub sender_email: String,
    #[serde(default)]
    pub sender_display_name: String,
    #[serde(default)]
    pub subject: String,
    pub body: String,
    pub channel: Channel,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

/// A single failed validation check on an inbound request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl AnalyzeRequest {
    /// Validate required fields, returning the full list of violations.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.message_uid.trim().is_empty() {
            errors.push(FieldError {
                field: "message_uid".into(),
                message: "must not be empty".into(),
            });
        }
        if !self.recipient_email.contains('@') {
            errors.push(FieldError {
                field: "recipient_email".into(),
                message: "must be an email address".into(),
            });
        }
        if !self.sender_email.contains('@') {
            errors.push(FieldError {
                field: "sender_email".into(),
                message: "must be an email address".into(),
            });
        }
        if self.body.trim().is_empty() {
            errors.push(FieldError {
                field: "body".into(),
                message: "must not be empty".into(),
            });
        }
        errors
    }
}

/// The pipeline's verdict for one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub analysis_id: i64,
    pub manipulation_score: f64,
    pub severity: Severity,
    pub explanation: String,
    pub recommended_action: RecommendedAction,
    pub dimension_scores: DimensionScores,
    pub processing_time_ms: u64,
}

/// Staged analysis pipeline.
pub struct AnalysisPipeline {
    prefilter: PreFilter,
    inference: Arc<dyn InferenceClient>,
    aggregator: ScoreAggregator,
    deviation: DeviationScorer,
    baseline_engine: Arc<BaselineEngine>,
    baseline_mailbox: BaselineMailbox,
    analysis_repo: Arc<dyn AnalysisRepository>,
    alert_repo: Arc<dyn AlertRepository>,
    hub: Arc<AlertHub>,
}

impl AnalysisPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        baseline_engine: Arc<BaselineEngine>,
        baseline_mailbox: BaselineMailbox,
        analysis_repo: Arc<dyn AnalysisRepository>,
        alert_repo: Arc<dyn AlertRepository>,
        hub: Arc<AlertHub>,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            prefilter: PreFilter::new(),
            inference,
            aggregator: ScoreAggregator::new(thresholds),
            deviation: DeviationScorer::new(),
            baseline_engine,
            baseline_mailbox,
            analysis_repo,
            alert_repo,
            hub,
        }
    }

    /// Run the full pipeline for one message. Persistence errors propagate;
    /// inference errors divert to the fallback path and the run completes.
    pub async fn run(&self, request: AnalyzeRequest) -> RepoResult<AnalyzeResponse> {
        let start = Instant::now();
        tracing::info!(
            message_uid = %request.message_uid,
            sender = %request.sender_email,
            recipient = %request.recipient_email,
            channel = %request.channel,
            "pipeline.start"
        );

        // Stage 1: rule-based prefilter, no inference involved.
        let prefilter = self.prefilter.evaluate(
            &request.subject,
            &request.body,
            &request.sender_email,
            request.received_at,
        );

        // Stage 2: sender baseline.
        let baseline = self
            .baseline_engine
            .lookup(&request.recipient_email, &request.sender_email)
            .await?;

        // Stage 3: behavioral deviation against the baseline.
        let deviation = self
            .deviation
            .score(&request.body, request.received_at, baseline.as_ref());

        // Stage 4: inference, falling back to prefilter-derived scores.
        let received_hour = request
            .received_at
            .map(|t| t.hour())
            .unwrap_or_else(|| Utc::now().hour());
        let word_count_deviation_pct = baseline.as_ref().and_then(|b| {
            (b.avg_word_count > 0.0).then(|| {
                let wc = body_metrics(&request.body).word_count as f64;
                (wc - b.avg_word_count) / b.avg_word_count * 100.0
            })
        });
        let prompt = build_analysis_prompt(
            &request.body,
            &request.sender_email,
            &request.sender_display_name,
            &request.subject,
            received_hour,
            baseline.as_ref(),
            word_count_deviation_pct,
            &prefilter.signals,
        );

        let verdict = match self.inference.analyze(SYSTEM_PROMPT, &prompt).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    message_uid = %request.message_uid,
                    "pipeline.inference_error"
                );
                fallback_verdict(&prefilter)
            }
        };

        // Stages 5-6: merge the deviation signal and aggregate.
        let scores = self.aggregator.merge(&verdict, deviation.deviation_score);
        let aggregate = self.aggregator.aggregate(&scores, prefilter.score_boost);
        let aggregate = (aggregate * 100.0).round() / 100.0;
        let severity = self.aggregator.severity(aggregate);
        let processing_ms = start.elapsed().as_millis() as u64;

        // Stage 7: persist. A fingerprint conflict returns the existing
        // record; the rest of the run is skipped for replays.
        let (record, created) = self
            .analysis_repo
            .insert(AnalysisInsert {
                fingerprint: MessageFingerprint::new(
                    request.recipient_email.clone(),
                    request.message_uid.clone(),
                ),
                sender_email: request.sender_email.clone(),
                sender_display_name: request.sender_display_name.clone(),
                subject: request.subject.clone(),
                channel: request.channel,
                received_at: request.received_at,
                prefilter_triggered: prefilter.triggered,
                prefilter_signals: prefilter.signals.clone(),
                manipulation_score: aggregate,
                dimension_scores: scores.clone(),
                explanation: verdict.explanation.clone(),
                recommended_action: verdict.recommended_action,
                inference_raw_response: verdict.raw_response.clone(),
                processing_time_ms: processing_ms,
            })
            .await?;

        if !created {
            tracing::info!(
                message_uid = %request.message_uid,
                analysis_id = record.id,
                "pipeline.duplicate_fingerprint"
            );
            return Ok(AnalyzeResponse {
                analysis_id: record.id,
                manipulation_score: record.manipulation_score,
                severity: self.aggregator.severity(record.manipulation_score),
                explanation: record.explanation,
                recommended_action: record.recommended_action,
                dimension_scores: record.dimension_scores,
                processing_time_ms: record.processing_time_ms,
            });
        }

        // Stage 8: alert and broadcast. Persistence precedes broadcast.
        if self.aggregator.alert_worthy(aggregate) {
            let alert = self.alert_repo.insert(record.id, severity).await?;
            self.hub.broadcast(&AlertEvent {
                event: "new_alert".into(),
                alert_id: alert.id,
                analysis_id: record.id,
                recipient_email: request.recipient_email.clone(),
                sender_email: request.sender_email.clone(),
                subject: request.subject.clone(),
                manipulation_score: aggregate,
                severity,
                explanation: verdict.explanation.clone(),
                recommended_action: verdict.recommended_action,
                dimension_scores: scores.clone(),
                timestamp: Utc::now(),
            });
        }

        // Stage 9: baseline update, fire-and-forget by value.
        self.baseline_mailbox.enqueue(BaselineUpdate {
            key: BaselineKey::new(&request.recipient_email, &request.sender_email),
            body: request.body.clone(),
            received_at: request.received_at,
        });

        tracing::info!(
            message_uid = %request.message_uid,
            aggregate_score = aggregate,
            severity = %severity,
            processing_ms,
            prefilter_triggered = prefilter.triggered,
            "pipeline.complete"
        );

        Ok(AnalyzeResponse {
            analysis_id: record.id,
            manipulation_score: aggregate,
            severity,
            explanation: verdict.explanation,
            recommended_action: verdict.recommended_action,
            dimension_scores: scores,
            processing_time_ms: processing_ms,
        })
    }
}

/// Synthesize a verdict from prefilter signals when inference is down.
/// Each signal maps to a fixed dimension score; the maximum wins when
/// several signals land on one dimension.
fn fallback_verdict(prefilter: &PreFilterResult) -> InferenceVerdict {
    let mut scores = DimensionScores::zeroed();
    let mut lift = |dim: Dimension, value: f64| {
        if value > scores.get(dim) {
            scores.set(dim, value);
        }
    };

    for signal in &prefilter.signals {
        let base = signal.split('(').next().unwrap_or(signal);
        match base {
            "urgency_language_detected" => lift(Dimension::ArtificialUrgency, 40.0),
            "authority_reference_detected" => lift(Dimension::AuthorityImpersonation, 45.0),
            "fear_threat_language_detected" => lift(Dimension::FearThreatInduction, 40.0),
            "emotional_manipulation_detected" => lift(Dimension::EmotionalEscalation, 35.0),
            "spoofed_sender_pattern" => lift(Dimension::AuthorityImpersonation, 60.0),
            "all_caps_subject" => lift(Dimension::EmotionalEscalation, 20.0),
            "suspicious_request_detected" => lift(Dimension::UnusualActionRequested, 50.0),
            _ => {}
        }
    }

    let recommended_action = if prefilter.triggered {
        RecommendedAction::Verify
    } else {
        RecommendedAction::Proceed
    };
    let primary_tactic = scores.primary_tactic();
    let raw_response = serde_json::json!({
        "dimension_scores": scores,
        "primary_tactic": primary_tactic.as_str(),
        "explanation": "Analysis based on rule-based pre-filter (inference unavailable).",
        "recommended_action": recommended_action.as_str(),
        "confidence": 30,
    })
    .to_string();

    InferenceVerdict {
        dimension_scores: scores,
        primary_tactic,
        explanation: "Analysis based on rule-based pre-filter (inference unavailable).".into(),
        recommended_action,
        confidence: 30,
        raw_response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cross_channel::CrossChannelDetector;
    use crate::inference::{validate_response, InferenceError};
    use crate::memory::{
        MemoryAlertRepository, MemoryAnalysisRepository, MemoryBaselineRepository,
    };
    use crate::repository::BaselineRepository;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use mindwall_common::SenderBaseline;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Inference double: either a canned JSON response or a hard failure.
    struct ScriptedInference {
        response: Option<String>,
    }

    #[async_trait]
    impl InferenceClient for ScriptedInference {
        async fn analyze(
            &self,
            _system: &str,
            _prompt: &str,
        ) -> Result<InferenceVerdict, InferenceError> {
            match &self.response {
                Some(raw) => validate_response(raw),
                None => Err(InferenceError::Status(500)),
            }
        }

        async fn check_health(&self) -> bool {
            self.response.is_some()
        }
    }

    struct Harness {
        pipeline: AnalysisPipeline,
        analysis_repo: Arc<MemoryAnalysisRepository>,
        alert_repo: Arc<MemoryAlertRepository>,
        baseline_repo: Arc<MemoryBaselineRepository>,
        baseline_engine: Arc<BaselineEngine>,
        updater: crate::baseline::BaselineUpdateHandle,
        events: UnboundedReceiver<String>,
    }

    fn harness(inference_response: Option<&str>) -> Harness {
        let analysis_repo = Arc::new(MemoryAnalysisRepository::new());
        let alert_repo = Arc::new(MemoryAlertRepository::new());
        let baseline_repo = Arc::new(MemoryBaselineRepository::new());
        let baseline_engine = Arc::new(BaselineEngine::new(baseline_repo.clone()));
        let (mailbox, updater) = BaselineEngine::spawn_updater(baseline_engine.clone());
        let hub = Arc::new(AlertHub::new());
        let (_id, events) = hub.subscribe();

        let pipeline = AnalysisPipeline::new(
            Arc::new(ScriptedInference {
                response: inference_response.map(|s| s.to_string()),
            }),
            baseline_engine.clone(),
            mailbox,
            analysis_repo.clone(),
            alert_repo.clone(),
            hub,
            AlertThresholds::default(),
        );

        Harness {
            pipeline,
            analysis_repo,
            alert_repo,
            baseline_repo,
            baseline_engine,
            updater,
            events,
        }
    }

    fn request(uid: &str, body: &str, subject: &str, sender: &str) -> AnalyzeRequest {
        AnalyzeRequest {
            message_uid: uid.into(),
            recipient_email: "bob@corp.com".into(),
            sender_email: sender.into(),
            sender_display_name: String::new(),
            subject: subject.into(),
            body: body.into(),
            channel: Channel::Retrieval,
            received_at: Some(Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap()),
        }
    }

    const HIGH_RISK_RESPONSE: &str = r#"{
        "dimension_scores": {
            "artificial_urgency": 90, "authority_impersonation": 85,
            "fear_threat_induction": 40, "reciprocity_exploitation": 5,
            "scarcity_tactics": 30, "social_proof_manipulation": 0,
            "sender_behavioral_deviation": 10, "cross_channel_coordination": 0,
            "emotional_escalation": 45, "request_context_mismatch": 70,
            "unusual_action_requested": 85, "timing_anomaly": 20
        },
        "primary_tactic": "artificial_urgency",
        "explanation": "Urgent wire transfer demand impersonating the CEO.",
        "recommended_action": "block",
        "confidence": 92
    }"#;

    const BENIGN_RESPONSE: &str = r#"{
        "dimension_scores": {
            "artificial_urgency": 2, "authority_impersonation": 0,
            "fear_threat_induction": 0, "reciprocity_exploitation": 0,
            "scarcity_tactics": 0, "social_proof_manipulation": 0,
            "sender_behavioral_deviation": 5, "cross_channel_coordination": 0,
            "emotional_escalation": 0, "request_context_mismatch": 3,
            "unusual_action_requested": 0, "timing_anomaly": 0
        },
        "primary_tactic": "sender_behavioral_deviation",
        "explanation": "Routine follow-up, no manipulation indicators.",
        "recommended_action": "proceed",
        "confidence": 95
    }"#;

    async fn seed_baseline(h: &Harness, samples: u64) {
        h.baseline_repo
            .upsert(SenderBaseline {
                key: BaselineKey::new("bob@corp.com", "alice@corp.com"),
                avg_word_count: 14.0,
                avg_sentence_length: 15.0,
                typical_hours: (9..=17).collect(),
                formality_score: 0.5,
                sample_count: samples,
                last_updated: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_urgency_authority_scenario_raises_alert() {
        let mut h = harness(Some(HIGH_RISK_RESPONSE));
        let response = h
            .pipeline
            .run(request(
                "1001",
                "URGENT: The CEO needs you to wire $50,000 by 3:00 PM today.",
                "URGENT REQUEST",
                "ceo@c0mpany.com",
            ))
            .await
            .unwrap();

        assert!(response.manipulation_score >= 60.0);
        assert!(matches!(
            response.severity,
            Severity::High | Severity::Critical
        ));

        let alert_counts = h.alert_repo.unacknowledged_counts().await.unwrap();
        assert_eq!(
            alert_counts.high + alert_counts.critical + alert_counts.medium,
            1
        );

        let event: AlertEvent =
            serde_json::from_str(&h.events.recv().await.unwrap()).unwrap();
        assert_eq!(event.event, "new_alert");
        assert_eq!(event.analysis_id, response.analysis_id);
    }

    #[tokio::test]
    async fn test_benign_followup_no_alert_and_baseline_grows() {
        let h = harness(Some(BENIGN_RESPONSE));
        seed_baseline(&h, 20).await;

        let response = h
            .pipeline
            .run(request(
                "1002",
                "Hi, following up on the Q4 numbers - no rush, end of week is fine.",
                "Q4 numbers",
                "alice@corp.com",
            ))
            .await
            .unwrap();

        assert!(response.manipulation_score < 35.0);
        assert_eq!(response.severity, Severity::Low);
        let counts = h.alert_repo.unacknowledged_counts().await.unwrap();
        assert_eq!(counts.low + counts.medium + counts.high + counts.critical, 0);

        drop(h.pipeline);
        h.updater.shutdown(Duration::from_secs(5)).await;
        let baseline = h
            .baseline_engine
            .lookup("bob@corp.com", "alice@corp.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(baseline.sample_count, 21);
    }

    #[tokio::test]
    async fn test_behavioral_swap_blends_deviation() {
        let h = harness(Some(BENIGN_RESPONSE));
        h.baseline_repo
            .upsert(SenderBaseline {
                key: BaselineKey::new("bob@corp.com", "alice@corp.com"),
                avg_word_count: 120.0,
                avg_sentence_length: 15.0,
                typical_hours: (9..=17).collect(),
                formality_score: 0.85,
                sample_count: 20,
                last_updated: Utc::now(),
            })
            .await
            .unwrap();

        let mut req = request(
            "1003",
            "yo gonna need that favor now lol thx",
            "favor",
            "alice@corp.com",
        );
        req.received_at = Some(Utc.with_ymd_and_hms(2024, 6, 3, 3, 0, 0).unwrap());

        let response = h.pipeline.run(req).await.unwrap();
        let blended = response
            .dimension_scores
            .get(Dimension::SenderBehavioralDeviation);
        assert!(blended >= 50.0, "blended deviation was {}", blended);
    }

    #[tokio::test]
    async fn test_inference_outage_falls_back_to_prefilter() {
        let mut h = harness(None);
        let response = h
            .pipeline
            .run(request(
                "1004",
                "URGENT: your account will be suspended unless you act now. \
                 Failure to comply means legal action.",
                "Account notice",
                "security@sketchy.biz",
            ))
            .await
            .unwrap();

        assert_eq!(response.recommended_action, RecommendedAction::Verify);
        assert_eq!(
            response.dimension_scores.get(Dimension::ArtificialUrgency),
            40.0
        );
        assert_eq!(
            response
                .dimension_scores
                .get(Dimension::FearThreatInduction),
            40.0
        );

        let record = h
            .analysis_repo
            .get_by_id(response.analysis_id)
            .await
            .unwrap()
            .unwrap();
        assert!(record.prefilter_triggered);
        assert!(record
            .explanation
            .contains("inference unavailable"));

        if response.manipulation_score >= 35.0 {
            let event = h.events.recv().await.unwrap();
            assert!(event.contains("new_alert"));
        }
    }

    #[tokio::test]
    async fn test_duplicate_fingerprint_returns_existing() {
        let h = harness(Some(HIGH_RISK_RESPONSE));
        let req = request(
            "1005",
            "URGENT: The CEO needs you to wire $50,000 by 3:00 PM today.",
            "URGENT REQUEST",
            "ceo@c0mpany.com",
        );
        let first = h.pipeline.run(req.clone()).await.unwrap();
        let second = h.pipeline.run(req).await.unwrap();

        assert_eq!(first.analysis_id, second.analysis_id);
        // Only one alert despite two submissions.
        let counts = h.alert_repo.unacknowledged_counts().await.unwrap();
        assert_eq!(counts.low + counts.medium + counts.high + counts.critical, 1);
    }

    #[tokio::test]
    async fn test_cross_channel_scenario() {
        let h = harness(Some(BENIGN_RESPONSE));
        // Two prior retrieval-channel analyses inside the window.
        for uid in ["2001", "2002"] {
            h.pipeline
                .run(request(uid, "checking in on that request.", "ping", "alice@corp.com"))
                .await
                .unwrap();
        }

        let detector = CrossChannelDetector::new(h.analysis_repo.clone());
        let report = detector
            .detect("bob@corp.com", "alice@corp.com", Channel::Web, None)
            .await
            .unwrap();
        assert!(report.detected);
        assert_eq!(report.channels_used.len(), 2);
        assert!(report.score >= 25.0);
    }

    #[test]
    fn test_request_validation_lists_all_failures() {
        let req = AnalyzeRequest {
            message_uid: "".into(),
            recipient_email: "not-an-email".into(),
            sender_email: "also-bad".into(),
            sender_display_name: String::new(),
            subject: String::new(),
            body: "  ".into(),
            channel: Channel::Web,
            received_at: None,
        };
        let errors = req.validate();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["message_uid", "recipient_email", "sender_email", "body"]
        );
    }
}
