use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{InvitationStatus, LightMessage, Notification};

/// Events pushed over the realtime gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeEvent {
    /// Server confirms the connection is authenticated
    Ready { user_id: Uuid, username: String },

    /// A notification row was written for the receiving user
    NotificationCreate { notification: Notification },

    /// A message was posted on a light
    MessageCreate { message: LightMessage, username: String },

    /// A message was edited
    MessageUpdate { message: LightMessage },

    /// A message was deleted
    MessageDelete { light_id: Uuid, message_id: Uuid },

    /// An RSVP changed, or an invitation was created or removed
    InvitationUpdate {
        light_id: Uuid,
        invitation_id: Uuid,
        user_id: Uuid,
        /// `None` when the invitation was removed
        status: Option<InvitationStatus>,
    },

    /// The light was cancelled by its author
    LightCancelled { light_id: Uuid },
}

impl RealtimeEvent {
    /// Returns the light this event is scoped to.
    /// Events that return `None` are only ever delivered to a targeted user.
    pub fn light_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { message, .. } => Some(message.light_id),
            Self::MessageUpdate { message } => Some(message.light_id),
            Self::MessageDelete { light_id, .. } => Some(*light_id),
            Self::InvitationUpdate { light_id, .. } => Some(*light_id),
            Self::LightCancelled { light_id } => Some(*light_id),
            Self::Ready { .. } | Self::NotificationCreate { .. } => None,
        }
    }
}

/// Commands sent from a client to the server over the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeCommand {
    /// Replace the set of lights whose change feed this connection follows.
    Subscribe { light_ids: Vec<Uuid> },
}
