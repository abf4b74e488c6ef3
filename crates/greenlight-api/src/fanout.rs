//! Notification fan-out.
//!
//! Every notification goes through [`Notifier::notify`]: the recipient's
//! preference for the kind is checked, the row is written, and the recipient's
//! open sockets get a `NotificationCreate`. Failures are logged and reported
//! as `None` so the operation that triggered the fan-out carries on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use greenlight_db::Database;
use greenlight_db::queries::NewNotification;
use greenlight_gateway::Dispatcher;
use greenlight_types::events::RealtimeEvent;
use greenlight_types::models::{Notification, NotificationKind, describe_lead};

use crate::state::AppState;

const PREVIEW_CHARS: usize = 50;

/// A notification ready to be delivered to one or more users.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: Option<Uuid>,
    pub data: serde_json::Value,
}

/// Counts from a multi-recipient fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutSummary {
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl Notifier {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(state.db.clone(), state.dispatcher.clone())
    }

    /// Deliver `out` to `recipient` unless they opted out of its kind.
    pub async fn notify(&self, recipient: Uuid, out: &Outgoing) -> Option<Notification> {
        match self.try_notify(recipient, out).await {
            Ok(Some(n)) => Some(n),
            Ok(None) => {
                debug!("{} notification to {} suppressed by preference", out.kind, recipient);
                None
            }
            Err(e) => {
                warn!("Failed to notify {} ({}): {:#}", recipient, out.kind, e);
                None
            }
        }
    }

    pub async fn notify_all(&self, recipients: &[Uuid], out: &Outgoing) -> FanoutSummary {
        let mut summary = FanoutSummary::default();
        for &recipient in recipients {
            match self.try_notify(recipient, out).await {
                Ok(Some(_)) => summary.sent += 1,
                Ok(None) => summary.suppressed += 1,
                Err(e) => {
                    warn!("Failed to notify {} ({}): {:#}", recipient, out.kind, e);
                    summary.failed += 1;
                }
            }
        }
        if !recipients.is_empty() {
            info!(
                "{} fan-out: {} sent, {} suppressed, {} failed",
                out.kind, summary.sent, summary.suppressed, summary.failed
            );
        }
        summary
    }

    /// Like [`Notifier::notify`] but surfaces the error. `Ok(None)` means the
    /// recipient opted out of this kind.
    pub async fn try_notify(&self, recipient: Uuid, out: &Outgoing) -> anyhow::Result<Option<Notification>> {
        let db = self.db.clone();
        let out_owned = out.clone();
        let written = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Notification>> {
            let uid = recipient.to_string();
            if !db.effective_preferences(&uid)?.allows(out_owned.kind) {
                return Ok(None);
            }
            let id = Uuid::new_v4().to_string();
            let related = out_owned.related_id.map(|r| r.to_string());
            let row = db.insert_notification(&NewNotification {
                id: &id,
                user_id: &uid,
                kind: out_owned.kind,
                title: &out_owned.title,
                message: &out_owned.message,
                related_id: related.as_deref(),
                data: &out_owned.data,
            })?;
            Ok(Some(row.into_notification()))
        })
        .await??;

        let Some(notification) = written else {
            return Ok(None);
        };
        if !self.dispatcher.is_connected(recipient).await {
            debug!("{} offline; {} notification stored only", recipient, out.kind);
            return Ok(Some(notification));
        }
        self.dispatcher
            .send_to_user(
                recipient,
                RealtimeEvent::NotificationCreate {
                    notification: notification.clone(),
                },
            )
            .await;
        Ok(Some(notification))
    }
}

/// First 50 characters of a message, with `...` when cut.
pub fn preview(message: &str) -> String {
    let mut chars = message.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

// -- Builders --

pub fn invitation(light_id: Uuid, light_title: &str, author_name: &str) -> Outgoing {
    Outgoing {
        kind: NotificationKind::LightInvitation,
        title: "New Event Invitation".into(),
        message: format!("{} invited you to \"{}\"", author_name, light_title),
        related_id: Some(light_id),
        data: json!({ "light_title": light_title, "author_name": author_name }),
    }
}

/// Message notice for the light's author.
pub fn message_to_owner(light_id: Uuid, light_title: &str, sender_name: &str, message: &str) -> Outgoing {
    Outgoing {
        kind: NotificationKind::LightMessageOwner,
        title: "New Message on Your Light".into(),
        message: format!("{}: \"{}\"", sender_name, preview(message)),
        related_id: Some(light_id),
        data: json!({ "light_title": light_title, "sender_name": sender_name, "message": message }),
    }
}

/// Message notice for accepted attendees.
pub fn message_to_attendee(light_id: Uuid, light_title: &str, sender_name: &str, message: &str) -> Outgoing {
    Outgoing {
        kind: NotificationKind::LightMessageAttending,
        title: "New Message on Light".into(),
        message: format!("{}: \"{}\"", sender_name, preview(message)),
        related_id: Some(light_id),
        data: json!({ "light_title": light_title, "sender_name": sender_name, "message": message }),
    }
}

pub fn attending(light_id: Uuid, light_title: &str, attendee_name: &str) -> Outgoing {
    Outgoing {
        kind: NotificationKind::LightAttending,
        title: "Someone Joined Your Light".into(),
        message: format!("{} is now attending \"{}\"", attendee_name, light_title),
        related_id: Some(light_id),
        data: json!({ "light_title": light_title, "attendee_name": attendee_name }),
    }
}

pub fn cancelled(light_id: Uuid, light_title: &str, author_name: &str) -> Outgoing {
    Outgoing {
        kind: NotificationKind::LightCancelled,
        title: "Light Cancelled".into(),
        message: format!("{} cancelled \"{}\"", author_name, light_title),
        related_id: Some(light_id),
        data: json!({ "light_title": light_title, "author_name": author_name }),
    }
}

pub fn reminder(light_id: Uuid, light_title: &str, start_time: DateTime<Utc>, lead_hours: u32) -> Outgoing {
    Outgoing {
        kind: NotificationKind::LightReminder,
        title: "Event Reminder".into(),
        message: format!("\"{}\" starts in {}", light_title, describe_lead(lead_hours)),
        related_id: Some(light_id),
        data: json!({
            "light_title": light_title,
            "start_time": start_time,
            "advance_hours": lead_hours,
        }),
    }
}

/// Operator-authored notice. Carries no related light.
pub fn system(title: &str, message: &str, data: serde_json::Value) -> Outgoing {
    Outgoing {
        kind: NotificationKind::System,
        title: title.to_string(),
        message: message.to_string(),
        related_id: None,
        data,
    }
}
