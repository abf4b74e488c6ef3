use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reminder lead times a user may choose from, in hours.
pub const REMINDER_LEAD_HOURS: [u32; 5] = [1, 2, 6, 12, 24];

pub const DEFAULT_REMINDER_LEAD_HOURS: u32 = 1;

pub fn is_valid_lead_hours(hours: u32) -> bool {
    REMINDER_LEAD_HOURS.contains(&hours)
}

/// Human phrasing for a lead time, e.g. "1 hour", "6 hours", "1 day".
pub fn describe_lead(hours: u32) -> String {
    match hours {
        1 => "1 hour".to_string(),
        24 => "1 day".to_string(),
        n => format!("{} hours", n),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Name shown to other users in notification copy.
    pub fn shown_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Compact user shape embedded in lists of invitations, messages, friends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Light {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_limit: Option<u32>,
    pub image_url: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Light {
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_time < now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvitationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            other => Err(format!("unknown invitation status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub light_id: Uuid,
    pub user_id: Uuid,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightMessage {
    pub id: Uuid,
    pub light_id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendList {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LightInvitation,
    LightMessageOwner,
    LightMessageAttending,
    LightAttending,
    LightReminder,
    LightCancelled,
    System,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LightInvitation => "light_invitation",
            Self::LightMessageOwner => "light_message_owner",
            Self::LightMessageAttending => "light_message_attending",
            Self::LightAttending => "light_attending",
            Self::LightReminder => "light_reminder",
            Self::LightCancelled => "light_cancelled",
            Self::System => "system",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light_invitation" => Ok(Self::LightInvitation),
            "light_message_owner" => Ok(Self::LightMessageOwner),
            "light_message_attending" => Ok(Self::LightMessageAttending),
            "light_attending" => Ok(Self::LightAttending),
            "light_reminder" => Ok(Self::LightReminder),
            "light_cancelled" => Ok(Self::LightCancelled),
            "system" => Ok(Self::System),
            other => Err(format!("unknown notification kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub related_id: Option<Uuid>,
    pub read: bool,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Per-user toggles, one per notification kind, plus the reminder lead time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub light_invitation: bool,
    pub light_message_owner: bool,
    pub light_message_attending: bool,
    pub light_attending: bool,
    pub light_reminder: bool,
    pub light_reminder_advance_hours: u32,
    pub light_cancelled: bool,
    pub system: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            light_invitation: true,
            light_message_owner: true,
            light_message_attending: true,
            light_attending: true,
            light_reminder: true,
            light_reminder_advance_hours: DEFAULT_REMINDER_LEAD_HOURS,
            light_cancelled: true,
            system: true,
        }
    }
}

impl NotificationPreferences {
    pub fn allows(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::LightInvitation => self.light_invitation,
            NotificationKind::LightMessageOwner => self.light_message_owner,
            NotificationKind::LightMessageAttending => self.light_message_attending,
            NotificationKind::LightAttending => self.light_attending,
            NotificationKind::LightReminder => self.light_reminder,
            NotificationKind::LightCancelled => self.light_cancelled,
            NotificationKind::System => self.system,
        }
    }

    /// The lead time reminders should use, or `None` when reminders are off.
    pub fn reminder_lead(&self) -> Option<u32> {
        self.light_reminder.then_some(self.light_reminder_advance_hours)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub light_id: Uuid,
    pub light_title: String,
    pub event_start_time: DateTime<Utc>,
    pub reminder_time: DateTime<Utc>,
    pub advance_hours: u32,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub light_id: Uuid,
    pub notification_id: Option<Uuid>,
    pub reminder_type: String,
    pub light_title: String,
    pub advance_hours: u32,
    pub event_start_time: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
}
