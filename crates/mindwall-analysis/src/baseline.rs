//! Per-sender behavioral baseline engine
//!
//! Tracks word count, sentence length, send timing, and formality per
//! `(recipient, sender)` pair, updating incrementally with an exponential
//! moving average. Updates for a single key are strictly serialized;
//! distinct keys update in parallel.

use crate::repository::{BaselineRepository, RepoResult};
use crate::text_metrics::{body_metrics, FormalityScorer};
use chrono::{DateTime, Timelike, Utc};
use dashmap::DashMap;
use mindwall_common::{BaselineKey, SenderBaseline};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

/// Smoothing factor for the exponential moving average.
const EMA_ALPHA: f64 = 0.15;

/// Maximum number of typical send-hours retained per baseline.
const MAX_TYPICAL_HOURS: usize = 8;

/// One observation to fold into a sender's baseline.
#[derive(Debug, Clone)]
pub struct BaselineUpdate {
    pub key: BaselineKey,
    pub body: String,
    pub received_at: Option<DateTime<Utc>>,
}

/// Engine owning baseline reads and writes.
pub struct BaselineEngine {
    repo: Arc<dyn BaselineRepository>,
    formality: FormalityScorer,
    key_locks: DashMap<BaselineKey, Arc<Mutex<()>>>,
}

impl BaselineEngine {
    pub fn new(repo: Arc<dyn BaselineRepository>) -> Self {
        Self {
            repo,
            formality: FormalityScorer::new(),
            key_locks: DashMap::new(),
        }
    }

    /// Fetch the baseline snapshot for a pair, or None when no history exists.
    pub async fn lookup(
        &self,
        recipient_email: &str,
        sender_email: &str,
    ) -> RepoResult<Option<SenderBaseline>> {
        self.repo
            .get(&BaselineKey::new(recipient_email, sender_email))
            .await
    }

    /// Fold one observation into the baseline. First observation inserts the
    /// raw values with sample count 1; later observations apply the EMA to
    /// the three scalar axes and accumulate the send-hour set.
    pub async fn apply_update(&self, update: BaselineUpdate) -> RepoResult<()> {
        let lock = self
            .key_locks
            .entry(update.key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let metrics = body_metrics(&update.body);
        let formality = self.formality.score(&update.body);
        let send_hour = update.received_at.map(|t| t.hour() as u8);

        let existing = self.repo.get(&update.key).await?;
        let baseline = match existing {
            None => SenderBaseline {
                key: update.key.clone(),
                avg_word_count: metrics.word_count as f64,
                avg_sentence_length: metrics.avg_sentence_length,
                typical_hours: send_hour.into_iter().collect(),
                formality_score: formality,
                sample_count: 1,
                last_updated: Utc::now(),
            },
            Some(prev) => {
                let mut hours = prev.typical_hours.clone();
                if let Some(hour) = send_hour {
                    if !hours.contains(&hour) {
                        hours.push(hour);
                        if hours.len() > MAX_TYPICAL_HOURS {
                            let excess = hours.len() - MAX_TYPICAL_HOURS;
                            hours.drain(..excess);
                        }
                    }
                }
                SenderBaseline {
                    key: update.key.clone(),
                    avg_word_count: ema(metrics.word_count as f64, prev.avg_word_count),
                    avg_sentence_length: ema(metrics.avg_sentence_length, prev.avg_sentence_length),
                    typical_hours: hours,
                    formality_score: ema(formality, prev.formality_score),
                    sample_count: prev.sample_count + 1,
                    last_updated: Utc::now(),
                }
            }
        };

        let sample_count = baseline.sample_count;
        self.repo.upsert(baseline).await?;
        tracing::debug!(
            recipient = %update.key.recipient_email,
            sender = %update.key.sender_email,
            sample_count,
            "baseline.updated"
        );
        Ok(())
    }

    /// Spawn the background updater fed by a bounded mailbox. The pipeline
    /// enqueues updates by value and never awaits them.
    pub fn spawn_updater(engine: Arc<Self>) -> (BaselineMailbox, BaselineUpdateHandle) {
        let (tx, mut rx) = mpsc::channel::<BaselineUpdate>(256);
        let worker = tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            while let Some(update) = rx.recv().await {
                let engine = engine.clone();
                in_flight.spawn(async move {
                    if let Err(e) = engine.apply_update(update).await {
                        tracing::warn!(error = %e, "baseline.update_failed");
                    }
                });
                // Reap finished updates so the set stays small.
                while in_flight.try_join_next().is_some() {}
            }
            // Mailbox closed: drain whatever is still running.
            while in_flight.join_next().await.is_some() {}
        });
        (BaselineMailbox { tx }, BaselineUpdateHandle { worker })
    }
}

fn ema(current: f64, previous: f64) -> f64 {
    EMA_ALPHA * current + (1.0 - EMA_ALPHA) * previous
}

/// Sending side of the baseline-update mailbox.
#[derive(Clone)]
pub struct BaselineMailbox {
    tx: mpsc::Sender<BaselineUpdate>,
}

impl BaselineMailbox {
    /// Enqueue an update without awaiting it. A full or closed mailbox drops
    /// the observation with a warning; baselines tolerate missed samples.
    pub fn enqueue(&self, update: BaselineUpdate) {
        if let Err(e) = self.tx.try_send(update) {
            tracing::warn!(error = %e, "baseline.enqueue_failed");
        }
    }
}

/// Shutdown handle for the background baseline updater.
pub struct BaselineUpdateHandle {
    worker: tokio::task::JoinHandle<()>,
}

impl BaselineUpdateHandle {
    /// Wait for the mailbox to drain once every `BaselineMailbox` clone is
    /// dropped, bounded by `deadline`. Updates still running at the deadline
    /// are abandoned; each upsert is atomic so no partial state persists.
    pub async fn shutdown(self, deadline: Duration) {
        if tokio::time::timeout(deadline, self.worker).await.is_err() {
            tracing::warn!("baseline.shutdown_deadline_exceeded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBaselineRepository;
    use chrono::TimeZone;

    fn engine() -> BaselineEngine {
        BaselineEngine::new(Arc::new(MemoryBaselineRepository::new()))
    }

    fn update(body: &str, hour: u32) -> BaselineUpdate {
        BaselineUpdate {
            key: BaselineKey::new("bob@corp.com", "alice@corp.com"),
            body: body.to_string(),
            received_at: Some(Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_first_observation_creates_baseline() {
        let engine = engine();
        engine
            .apply_update(update("One two three. Four five six.", 9))
            .await
            .unwrap();

        let baseline = engine
            .lookup("bob@corp.com", "alice@corp.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(baseline.sample_count, 1);
        assert_eq!(baseline.avg_word_count, 6.0);
        assert_eq!(baseline.typical_hours, vec![9]);
    }

    #[tokio::test]
    async fn test_ema_converges_on_repeated_value() {
        let engine = engine();
        let body = "Ten words in this body exactly right here now okay.";
        for _ in 0..50 {
            engine.apply_update(update(body, 10)).await.unwrap();
        }
        let baseline = engine
            .lookup("bob@corp.com", "alice@corp.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(baseline.sample_count, 50);
        assert!((baseline.avg_word_count - 10.0).abs() < 1e-3);
        assert!((baseline.avg_sentence_length - 10.0).abs() < 1e-3);
        assert!((baseline.formality_score - 0.5).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_typical_hours_bounded_to_eight() {
        let engine = engine();
        for hour in 6..=16 {
            engine.apply_update(update("hello there friend.", hour)).await.unwrap();
        }
        let baseline = engine
            .lookup("bob@corp.com", "alice@corp.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(baseline.typical_hours.len(), 8);
        // The eight most recently added hours survive.
        assert_eq!(baseline.typical_hours, vec![9, 10, 11, 12, 13, 14, 15, 16]);
    }

    #[tokio::test]
    async fn test_repeated_hour_not_duplicated() {
        let engine = engine();
        for _ in 0..3 {
            engine.apply_update(update("hello.", 9)).await.unwrap();
        }
        let baseline = engine
            .lookup("bob@corp.com", "alice@corp.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(baseline.typical_hours, vec![9]);
    }

    #[tokio::test]
    async fn test_background_updater_applies_and_drains() {
        let engine = Arc::new(engine());
        let (mailbox, handle) = BaselineEngine::spawn_updater(engine.clone());
        for _ in 0..5 {
            mailbox.enqueue(update("a few words here.", 11));
        }
        drop(mailbox);
        handle.shutdown(Duration::from_secs(5)).await;

        let baseline = engine
            .lookup("bob@corp.com", "alice@corp.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(baseline.sample_count, 5);
    }
}
