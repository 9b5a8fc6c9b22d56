//! Cross-channel coordination detector
//!
//! Flags senders who contact the same recipient through multiple channels
//! inside a 24-hour window, with escalating manipulation scores treated as
//! an additional signal.

use crate::repository::{AnalysisRepository, RepoResult};
use chrono::{DateTime, Duration, Utc};
use mindwall_common::Channel;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Time window considered as coordinated.
const COORDINATION_WINDOW_HOURS: i64 = 24;

/// Minimum distinct channels (including the current one) for a signal.
const MIN_CHANNELS: usize = 2;

/// Outcome of a coordination check.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinationReport {
    pub detected: bool,
    pub score: f64,
    pub channels_used: Vec<Channel>,
    pub recent_analysis_count: usize,
}

/// Detects coordinated multi-channel contact patterns.
pub struct CrossChannelDetector {
    analysis_repo: Arc<dyn AnalysisRepository>,
}

impl CrossChannelDetector {
    pub fn new(analysis_repo: Arc<dyn AnalysisRepository>) -> Self {
        Self { analysis_repo }
    }

    /// Check the 24-hour window ending at `received_at` (now when absent)
    /// for multi-channel contact from `sender` to `recipient`.
    pub async fn detect(
        &self,
        recipient_email: &str,
        sender_email: &str,
        current_channel: Channel,
        received_at: Option<DateTime<Utc>>,
    ) -> RepoResult<CoordinationReport> {
        let reference = received_at.unwrap_or_else(Utc::now);
        let window_start = reference - Duration::hours(COORDINATION_WINDOW_HOURS);

        let recent = self
            .analysis_repo
            .recent_by_sender_recipient(recipient_email, sender_email, window_start)
            .await?;

        if recent.is_empty() {
            return Ok(CoordinationReport {
                detected: false,
                score: 0.0,
                channels_used: vec![current_channel],
                recent_analysis_count: 0,
            });
        }

        let mut channels: BTreeSet<&'static str> = BTreeSet::new();
        channels.insert(current_channel.as_str());
        for analysis in &recent {
            channels.insert(analysis.channel.as_str());
        }
        let channel_count = channels.len();
        let detected = channel_count >= MIN_CHANNELS;

        let mut score = 0.0;
        if detected {
            score += (channel_count as f64 - 1.0) * 25.0;
            score += (recent.len() as f64 * 10.0).min(30.0);
            // Escalation: the window's scores, oldest to newest, rose.
            let first = recent.first().map(|a| a.manipulation_score);
            let last = recent.last().map(|a| a.manipulation_score);
            if let (Some(first), Some(last)) = (first, last) {
                if recent.len() >= 2 && last > first {
                    score += 20.0;
                }
            }
        }
        let score = score.clamp(0.0, 100.0);

        let mut channels_used: Vec<Channel> = Vec::with_capacity(channel_count);
        for name in channels {
            match name {
                "imap" => channels_used.push(Channel::Retrieval),
                "gmail_web" => channels_used.push(Channel::Web),
                _ => {}
            }
        }

        if detected {
            tracing::warn!(
                recipient = recipient_email,
                sender = sender_email,
                channels = ?channels_used,
                score,
                "cross_channel.detected"
            );
        }

        Ok(CoordinationReport {
            detected,
            score,
            channels_used,
            recent_analysis_count: recent.len(),
        })
    }
}
