//! Database row types. These map directly to SQLite rows and convert into the
//! greenlight-types models; corrupt ids or timestamps are logged and defaulted.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use greenlight_types::models::{
    FriendList, Invitation, InvitationStatus, Light, LightMessage, Notification,
    NotificationKind, Reminder, ReminderLog, User, UserSummary,
};

use crate::time::parse_ts;

pub fn uuid_or_default(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub fn ts_or_default(raw: &str, what: &str) -> DateTime<Utc> {
    parse_ts(raw).unwrap_or_else(|| {
        warn!("Corrupt {} '{}'", what, raw);
        DateTime::default()
    })
}

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: uuid_or_default(&self.id, "user id"),
            created_at: ts_or_default(&self.created_at, "user created_at"),
            username: self.username,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: uuid_or_default(&self.id, "user id"),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }

    pub fn shown_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// The user columns carried along by joined queries.
#[derive(Debug, Clone)]
pub struct UserSummaryRow {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserSummaryRow {
    pub fn into_summary(self) -> UserSummary {
        UserSummary {
            id: uuid_or_default(&self.id, "user id"),
            username: self.username,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LightRow {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    pub start_time: String,
    pub end_time: String,
    pub max_limit: Option<u32>,
    pub image_url: Option<String>,
    pub published: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl LightRow {
    pub fn into_light(self) -> Light {
        Light {
            id: uuid_or_default(&self.id, "light id"),
            author_id: uuid_or_default(&self.author_id, "light author_id"),
            start_time: ts_or_default(&self.start_time, "light start_time"),
            end_time: ts_or_default(&self.end_time, "light end_time"),
            created_at: ts_or_default(&self.created_at, "light created_at"),
            updated_at: ts_or_default(&self.updated_at, "light updated_at"),
            title: self.title,
            description: self.description,
            location: self.location,
            max_limit: self.max_limit,
            image_url: self.image_url,
            published: self.published,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        ts_or_default(&self.start_time, "light start_time")
    }

    pub fn end(&self) -> DateTime<Utc> {
        ts_or_default(&self.end_time, "light end_time")
    }
}

#[derive(Debug, Clone)]
pub struct InvitationRow {
    pub id: String,
    pub light_id: String,
    pub user_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl InvitationRow {
    pub fn status(&self) -> InvitationStatus {
        self.status.parse().unwrap_or_else(|e| {
            warn!("Corrupt status on invitation '{}': {}", self.id, e);
            InvitationStatus::Pending
        })
    }

    pub fn into_invitation(self) -> Invitation {
        Invitation {
            id: uuid_or_default(&self.id, "invitation id"),
            light_id: uuid_or_default(&self.light_id, "invitation light_id"),
            user_id: uuid_or_default(&self.user_id, "invitation user_id"),
            status: self.status(),
            created_at: ts_or_default(&self.created_at, "invitation created_at"),
            updated_at: ts_or_default(&self.updated_at, "invitation updated_at"),
        }
    }
}

pub struct MessageRow {
    pub id: String,
    pub light_id: String,
    pub user_id: String,
    pub message: String,
    pub created_at: String,
    pub updated_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> LightMessage {
        LightMessage {
            id: uuid_or_default(&self.id, "message id"),
            light_id: uuid_or_default(&self.light_id, "message light_id"),
            user_id: uuid_or_default(&self.user_id, "message user_id"),
            created_at: ts_or_default(&self.created_at, "message created_at"),
            updated_at: ts_or_default(&self.updated_at, "message updated_at"),
            message: self.message,
        }
    }
}

pub struct ListRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: String,
}

impl ListRow {
    pub fn into_list(self) -> FriendList {
        FriendList {
            id: uuid_or_default(&self.id, "list id"),
            user_id: uuid_or_default(&self.user_id, "list user_id"),
            created_at: ts_or_default(&self.created_at, "list created_at"),
            name: self.name,
        }
    }
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub related_id: Option<String>,
    pub read: bool,
    pub data: String,
    pub created_at: String,
}

impl NotificationRow {
    pub fn into_notification(self) -> Notification {
        let kind = self.kind.parse().unwrap_or_else(|e| {
            warn!("Corrupt kind on notification '{}': {}", self.id, e);
            NotificationKind::System
        });
        let data = serde_json::from_str(&self.data).unwrap_or_else(|e| {
            warn!("Corrupt data on notification '{}': {}", self.id, e);
            serde_json::Value::Object(Default::default())
        });
        Notification {
            id: uuid_or_default(&self.id, "notification id"),
            user_id: uuid_or_default(&self.user_id, "notification user_id"),
            related_id: self
                .related_id
                .as_deref()
                .map(|r| uuid_or_default(r, "notification related_id")),
            created_at: ts_or_default(&self.created_at, "notification created_at"),
            title: self.title,
            message: self.message,
            kind,
            read: self.read,
            data,
        }
    }
}

pub struct ReminderRow {
    pub id: String,
    pub user_id: String,
    pub light_id: String,
    pub light_title: String,
    pub event_start_time: String,
    pub reminder_time: String,
    pub advance_hours: u32,
    pub sent: bool,
    pub created_at: String,
}

impl ReminderRow {
    pub fn into_reminder(self) -> Reminder {
        Reminder {
            id: uuid_or_default(&self.id, "reminder id"),
            user_id: uuid_or_default(&self.user_id, "reminder user_id"),
            light_id: uuid_or_default(&self.light_id, "reminder light_id"),
            event_start_time: ts_or_default(&self.event_start_time, "reminder event_start_time"),
            reminder_time: ts_or_default(&self.reminder_time, "reminder reminder_time"),
            created_at: ts_or_default(&self.created_at, "reminder created_at"),
            light_title: self.light_title,
            advance_hours: self.advance_hours,
            sent: self.sent,
        }
    }
}

pub struct ReminderLogRow {
    pub id: String,
    pub user_id: String,
    pub light_id: String,
    pub notification_id: Option<String>,
    pub reminder_type: String,
    pub light_title: String,
    pub advance_hours: u32,
    pub event_start_time: String,
    pub sent_at: String,
}

impl ReminderLogRow {
    pub fn into_log(self) -> ReminderLog {
        ReminderLog {
            id: uuid_or_default(&self.id, "reminder log id"),
            user_id: uuid_or_default(&self.user_id, "reminder log user_id"),
            light_id: uuid_or_default(&self.light_id, "reminder log light_id"),
            notification_id: self
                .notification_id
                .as_deref()
                .map(|n| uuid_or_default(n, "reminder log notification_id")),
            event_start_time: ts_or_default(&self.event_start_time, "reminder log event_start_time"),
            sent_at: ts_or_default(&self.sent_at, "reminder log sent_at"),
            reminder_type: self.reminder_type,
            light_title: self.light_title,
            advance_hours: self.advance_hours,
        }
    }
}
