//! Real-time alert broadcast hub
//!
//! Fan-out of alert events to connected observers. The payload is
//! serialized once per broadcast and the buffer cloned to each sink;
//! sinks that fail delivery are unregistered silently. Ordering is FIFO
//! within one subscriber, unspecified across subscribers.

use chrono::{DateTime, Utc};
use mindwall_common::{DimensionScores, RecommendedAction, Severity};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Event pushed to every subscriber when a new alert is raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub event: String,
    pub alert_id: i64,
    pub analysis_id: i64,
    pub recipient_email: String,
    pub sender_email: String,
    pub subject: String,
    pub manipulation_score: f64,
    pub severity: Severity,
    pub explanation: String,
    pub recommended_action: RecommendedAction,
    pub dimension_scores: DimensionScores,
    pub timestamp: DateTime<Utc>,
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// Subscriber registry and broadcast fan-out.
#[derive(Default)]
pub struct AlertHub {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl AlertHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. The returned receiver yields serialized
    /// events in broadcast order.
    pub fn subscribe(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers.write().push(Subscriber { id, tx });
        tracing::info!(total = self.subscriber_count(), "alert_hub.subscribed");
        (id, rx)
    }

    /// Remove a subscriber. Idempotent.
    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.write().retain(|s| s.id != id);
        tracing::info!(total = self.subscriber_count(), "alert_hub.unsubscribed");
    }

    /// Serialize the event once and deliver best-effort to every sink.
    /// Sinks whose receiver is gone are evicted.
    pub fn broadcast(&self, event: &AlertEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "alert_hub.serialize_failed");
                return;
            }
        };

        let mut dead: Vec<Uuid> = Vec::new();
        {
            let subscribers = self.subscribers.read();
            if subscribers.is_empty() {
                return;
            }
            for subscriber in subscribers.iter() {
                if subscriber.tx.send(payload.clone()).is_err() {
                    dead.push(subscriber.id);
                }
            }
            tracing::debug!(
                event = %event.event,
                recipients = subscribers.len() - dead.len(),
                "alert_hub.broadcast"
            );
        }

        if !dead.is_empty() {
            self.subscribers.write().retain(|s| !dead.contains(&s.id));
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
