//! Alert delivery.
//!
//! The result processor emits one [`AlertEvent`] per incident transition;
//! the notifier worker mirrors it to the push channel, renders the email and
//! delivers it with bounded retries. The (incident, transition) pair is the
//! idempotency key: a transition already recorded in the alert ledger is
//! never delivered twice, across retries or restarts.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use vigil_core::{
    IncidentId, LocationDetails, Region, Target, TimestampMs, ALERT_RETRY_SCHEDULE_SECS,
};
use vigil_store::AlertLedger;

use crate::email::EmailSender;
use crate::push::{
    incident_opened_topic, incident_resolved_topic, PushChannel, PushMessage, PushPayload,
    TOPIC_OPERATOR_ALERT,
};

// ── AlertEvent ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertTransition {
    Down,
    Up,
}

impl AlertTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertTransition::Down => "down",
            AlertTransition::Up => "up",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AlertEvent {
    pub incident_id: IncidentId,
    pub transition: AlertTransition,
    /// Target snapshot at processing time — name, url and contacts for the
    /// email body.
    pub target: Target,
    pub reason: String,
    pub region: Region,
    pub location: Option<LocationDetails>,
    pub timestamp: TimestampMs,
}

// ── Notifier worker ──────────────────────────────────────────────────────────

pub fn spawn(
    mut rx: mpsc::Receiver<AlertEvent>,
    alerts: Arc<dyn AlertLedger>,
    email: Arc<dyn EmailSender>,
    push: Arc<dyn PushChannel>,
    email_enabled: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = deliver(&event, &*alerts, &*email, &*push, email_enabled).await {
                error!(
                    incident = %event.incident_id,
                    transition = event.transition.as_str(),
                    error = %e,
                    "alert delivery gave up"
                );
                push.publish(operator_alert(&event, &e.to_string()));
            }
        }
        info!("notifier stopped");
    })
}

async fn deliver(
    event: &AlertEvent,
    alerts: &dyn AlertLedger,
    email: &dyn EmailSender,
    push: &dyn PushChannel,
    email_enabled: bool,
) -> Result<(), vigil_core::VigilError> {
    let transition = event.transition.as_str();
    if alerts.already_sent(&event.incident_id, transition)? {
        warn!(incident = %event.incident_id, transition, "alert already delivered; skipping");
        return Ok(());
    }

    push.publish(incident_push(event));

    let delivery = if email_enabled {
        send_with_retries(event, email).await
    } else {
        Ok(())
    };

    // Mark regardless of the email outcome: the transition was emitted once,
    // and retries have been exhausted. The caller raises an operator alert on
    // failure.
    alerts.mark_sent(&event.incident_id, transition, event.timestamp)?;
    delivery
}

async fn send_with_retries(
    event: &AlertEvent,
    email: &dyn EmailSender,
) -> Result<(), vigil_core::VigilError> {
    let recipients = recipients(event);
    if recipients.is_empty() {
        return Ok(());
    }
    let (subject, body) = render_alert_email(event);

    let attempts = ALERT_RETRY_SCHEDULE_SECS.len();
    let mut last_err = None;
    for (attempt, backoff_secs) in ALERT_RETRY_SCHEDULE_SECS.iter().enumerate() {
        match email.send(&recipients, &subject, &body).await {
            Ok(()) => {
                info!(
                    incident = %event.incident_id,
                    transition = event.transition.as_str(),
                    recipients = recipients.len(),
                    "alert email sent"
                );
                return Ok(());
            }
            Err(e) => {
                warn!(
                    incident = %event.incident_id,
                    attempt = attempt + 1,
                    error = %e,
                    "alert email attempt failed"
                );
                last_err = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(Duration::from_secs(*backoff_secs)).await;
                }
            }
        }
    }
    Err(last_err
        .unwrap_or_else(|| vigil_core::VigilError::Internal("no delivery attempt ran".into())))
}

/// Alert contacts, plus the owner address on `down` transitions.
fn recipients(event: &AlertEvent) -> Vec<String> {
    let mut out = event.target.alert_contacts.clone();
    if event.transition == AlertTransition::Down {
        if let Some(owner) = &event.target.owner_email {
            if !out.contains(owner) {
                out.push(owner.clone());
            }
        }
    }
    out
}

/// Subject and plain-text body for an alert email.
pub fn render_alert_email(event: &AlertEvent) -> (String, String) {
    let when = chrono::Utc
        .timestamp_millis_opt(event.timestamp)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| event.timestamp.to_string());

    let verb = match event.transition {
        AlertTransition::Down => "DOWN",
        AlertTransition::Up => "RECOVERED",
    };
    let subject = format!("[vigil] {} is {verb}", event.target.name);

    let location = event.location.clone().unwrap_or_default();
    let body = format!(
        "Target:    {}\n\
         URL:       {}\n\
         Status:    {verb}\n\
         Reason:    {}\n\
         Region:    {}\n\
         Location:  {}\n\
         Coords:    {}\n\
         Time:      {when}\n",
        event.target.name,
        event.target.url,
        event.reason,
        event.region,
        location.label(),
        location.coords_label(),
    );
    (subject, body)
}

fn incident_push(event: &AlertEvent) -> PushMessage {
    let topic = match event.transition {
        AlertTransition::Down => incident_opened_topic(&event.target.id),
        AlertTransition::Up => incident_resolved_topic(&event.target.id),
    };
    PushMessage {
        topic,
        payload: PushPayload {
            target_id: event.target.id.to_hex(),
            status: match event.transition {
                AlertTransition::Down => "opened".into(),
                AlertTransition::Up => "resolved".into(),
            },
            response_time_ms: None,
            region: event.region.to_string(),
            timestamp: event.timestamp,
            reason: Some(event.reason.clone()),
        },
    }
}

fn operator_alert(event: &AlertEvent, detail: &str) -> PushMessage {
    PushMessage {
        topic: TOPIC_OPERATOR_ALERT.into(),
        payload: PushPayload {
            target_id: event.target.id.to_hex(),
            status: "alert_delivery_failed".into(),
            response_time_ms: None,
            region: event.region.to_string(),
            timestamp: event.timestamp,
            reason: Some(detail.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{OwnerId, ProbeKind, TargetSpec};

    fn event(transition: AlertTransition) -> AlertEvent {
        let target = Target::new(
            OwnerId::from("owner-1"),
            TargetSpec {
                name: "shop".into(),
                url: "https://shop.example.com".into(),
                kind: ProbeKind::Https,
                interval_secs: 60,
                timeout_ms: 5_000,
                expected_status: 200,
                regions: vec![Region::from("eu-west")],
                alert_threshold: 3,
                recovery_threshold: 1,
                alert_contacts: vec!["ops@example.com".into()],
                owner_email: Some("owner@example.com".into()),
            },
            0,
        );
        AlertEvent {
            incident_id: IncidentId::random(),
            transition,
            target,
            reason: "timeout".into(),
            region: Region::from("eu-west"),
            location: Some(LocationDetails {
                city: Some("Dublin".into()),
                country: Some("IE".into()),
                coords: Some((53.35, -6.26)),
                ip: None,
            }),
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn email_body_carries_every_required_field() {
        let e = event(AlertTransition::Down);
        let (subject, body) = render_alert_email(&e);
        assert!(subject.contains("shop"));
        assert!(subject.contains("DOWN"));
        assert!(body.contains("https://shop.example.com"));
        assert!(body.contains("timeout"));
        assert!(body.contains("eu-west"));
        assert!(body.contains("Dublin, IE"));
        assert!(body.contains("53.35"));
        assert!(body.contains("2023")); // rfc3339 timestamp
    }

    #[test]
    fn missing_location_renders_unknown() {
        let mut e = event(AlertTransition::Up);
        e.location = None;
        let (_, body) = render_alert_email(&e);
        assert!(body.contains("Unknown, Unknown"));
    }

    #[test]
    fn owner_is_added_for_down_only() {
        let down = recipients(&event(AlertTransition::Down));
        assert!(down.contains(&"owner@example.com".to_string()));
        assert!(down.contains(&"ops@example.com".to_string()));

        let up = recipients(&event(AlertTransition::Up));
        assert!(!up.contains(&"owner@example.com".to_string()));
    }

    #[test]
    fn owner_already_in_contacts_is_not_duplicated() {
        let mut e = event(AlertTransition::Down);
        e.target.alert_contacts = vec!["owner@example.com".into()];
        let r = recipients(&e);
        assert_eq!(r.len(), 1);
    }
}
