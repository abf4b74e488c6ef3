use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    FriendList, Invitation, InvitationStatus, Light, LightMessage, Notification, ReminderLog,
    UserSummary,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the realtime gateway upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// -- Lights --

/// Bulk invitation target: members of owned friend-lists plus individual friends.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InviteRequest {
    #[serde(default)]
    pub list_ids: Vec<Uuid>,
    #[serde(default)]
    pub user_ids: Vec<Uuid>,
}

impl InviteRequest {
    pub fn is_empty(&self) -> bool {
        self.list_ids.is_empty() && self.user_ids.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateLightRequest {
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_limit: Option<u32>,
    pub image_url: Option<String>,
    #[serde(default = "default_published")]
    pub published: bool,
    pub invite: Option<InviteRequest>,
}

fn default_published() -> bool {
    true
}

/// Partial update. `Some(None)` on a nullable field clears it.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateLightRequest {
    pub title: Option<String>,
    #[serde(default, with = "double_option")]
    pub description: Option<Option<String>>,
    pub location: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, with = "double_option")]
    pub max_limit: Option<Option<u32>>,
    #[serde(default, with = "double_option")]
    pub image_url: Option<Option<String>>,
    pub published: Option<bool>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvitationCounts {
    pub accepted: u32,
    pub pending: u32,
    pub declined: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LightDetail {
    #[serde(flatten)]
    pub light: Light,
    pub author: UserSummary,
    pub counts: InvitationCounts,
    /// Caller's own RSVP, `None` for the author.
    pub my_status: Option<InvitationStatus>,
}

/// One entry of the active/past views: a light with the caller's status on it.
#[derive(Debug, Serialize, Deserialize)]
pub struct LightWithStatus {
    pub invitation_id: Option<Uuid>,
    pub status: InvitationStatus,
    pub is_owner: bool,
    pub light: Light,
    pub author: UserSummary,
}

// -- Invitations --

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteResponse {
    pub invited: Vec<Uuid>,
    pub already_invited: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespondRequest {
    pub status: InvitationStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvitationWithUser {
    #[serde(flatten)]
    pub invitation: Invitation,
    pub user: UserSummary,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageWithUser {
    #[serde(flatten)]
    pub message: LightMessage,
    pub user: UserSummary,
}

// -- Friends & lists --

#[derive(Debug, Serialize, Deserialize)]
pub struct DirectoryEntry {
    #[serde(flatten)]
    pub user: UserSummary,
    pub is_friend: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddFriendRequest {
    pub friend_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateListRequest {
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameListRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListSummary {
    #[serde(flatten)]
    pub list: FriendList,
    pub member_count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListDetail {
    #[serde(flatten)]
    pub list: FriendList,
    pub members: Vec<UserSummary>,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct NotificationCount {
    pub unread: u32,
    pub total: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub limit: u32,
    pub offset: u32,
}

/// Partial preference update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePreferencesRequest {
    pub light_invitation: Option<bool>,
    pub light_message_owner: Option<bool>,
    pub light_message_attending: Option<bool>,
    pub light_attending: Option<bool>,
    pub light_reminder: Option<bool>,
    pub light_reminder_advance_hours: Option<u32>,
    pub light_cancelled: Option<bool>,
    pub system: Option<bool>,
}

// -- Service endpoints --

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepReport {
    /// Scheduled reminder rows found due.
    pub scheduled_due: usize,
    /// Attendees matched by the lead-time scan.
    pub lead_time_matches: usize,
    pub sent: usize,
    /// Already claimed, opted out, or stale.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SweepResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub report: SweepReport,
}

/// Operator broadcast of a `system` notification.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemNotificationRequest {
    pub user_ids: Vec<Uuid>,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemNotificationResponse {
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReminderLogPage {
    pub logs: Vec<ReminderLog>,
    pub count: usize,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpcomingEvent {
    pub id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub published: bool,
    pub time_until_event: String,
    pub time_until_event_ms: i64,
    pub accepted_attendees: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpcomingEventsResponse {
    pub current_time: DateTime<Utc>,
    pub events_found: usize,
    pub events: Vec<UpcomingEvent>,
}

/// Distinguishes an absent field from an explicit `null` in partial updates.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
