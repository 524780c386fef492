//! In-process push channel.
//!
//! Real-time status updates fan out over a tokio broadcast bus. Topics:
//!   monitor:update/{targetId}      — every processed check
//!   incident:opened/{targetId}     — incident opened
//!   incident:resolved/{targetId}   — incident resolved
//!   operator:alert                 — payment/notifier give-ups
//!
//! Subscription authentication (owner/admin scope) happens at the transport
//! handshake upstream; the hub itself only routes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use vigil_core::{TargetId, TimestampMs};

pub const TOPIC_OPERATOR_ALERT: &str = "operator:alert";

pub fn monitor_update_topic(target: &TargetId) -> String {
    format!("monitor:update/{target}")
}

pub fn incident_opened_topic(target: &TargetId) -> String {
    format!("incident:opened/{target}")
}

pub fn incident_resolved_topic(target: &TargetId) -> String {
    format!("incident:resolved/{target}")
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushPayload {
    pub target_id: String,
    /// "up" / "down" for check updates, "opened" / "resolved" for incidents.
    pub status: String,
    pub response_time_ms: Option<u64>,
    pub region: String,
    pub timestamp: TimestampMs,
    pub reason: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PushMessage {
    pub topic: String,
    pub payload: PushPayload,
}

/// Outbound push port. Implemented by [`PushHub`]; tests may record instead.
pub trait PushChannel: Send + Sync {
    fn publish(&self, message: PushMessage);
}

/// Broadcast-backed hub. Cloning shares the underlying bus; lagging or absent
/// subscribers never block publishers.
#[derive(Clone)]
pub struct PushHub {
    tx: broadcast::Sender<PushMessage>,
}

impl PushHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.tx.subscribe()
    }
}

impl PushChannel for PushHub {
    fn publish(&self, message: PushMessage) {
        // Err means no subscriber is currently listening; updates are
        // fire-and-forget so that is fine.
        let _ = self.tx.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_updates() {
        let hub = PushHub::new(8);
        let mut rx = hub.subscribe();

        let target = TargetId::random();
        hub.publish(PushMessage {
            topic: monitor_update_topic(&target),
            payload: PushPayload {
                target_id: target.to_hex(),
                status: "up".into(),
                response_time_ms: Some(12),
                region: "eu-west".into(),
                timestamp: 1_000,
                reason: None,
            },
        });

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, format!("monitor:update/{target}"));
        assert_eq!(msg.payload.status, "up");
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let hub = PushHub::new(8);
        hub.publish(PushMessage {
            topic: TOPIC_OPERATOR_ALERT.into(),
            payload: PushPayload {
                target_id: String::new(),
                status: "payment_failed".into(),
                response_time_ms: None,
                region: String::new(),
                timestamp: 0,
                reason: None,
            },
        });
    }
}
