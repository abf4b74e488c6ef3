use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use greenlight_db::models::uuid_or_default;
use greenlight_types::api::{Claims, MessageWithUser, PostMessageRequest};
use greenlight_types::events::RealtimeEvent;
use greenlight_types::models::{InvitationStatus, LightMessage};

use crate::error::{ApiError, ApiResult};
use crate::fanout::{self, Notifier};
use crate::lights::load_visible_light;
use crate::state::{AppState, blocking};

const MAX_MESSAGE_CHARS: usize = 2000;

fn clean(message: &str) -> ApiResult<String> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request("message cannot be empty"));
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::bad_request("message too long"));
    }
    Ok(trimmed.to_string())
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(light_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<MessageWithUser>>> {
    let rows = blocking(&state, move |db| {
        let light = load_visible_light(db, light_id, claims.sub)?;
        Ok(db.list_messages(&light.id)?)
    })
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(|(msg, user)| MessageWithUser {
                message: msg.into_message(),
                user: user.into_summary(),
            })
            .collect(),
    ))
}

/// Posts a message. The author hears about it unless they wrote it, and
/// accepted attendees other than the poster get the attendee variant.
pub async fn post_message(
    State(state): State<AppState>,
    Path(light_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let text = clean(&req.message)?;

    let (light, row, sender, attendees) = blocking(&state, move |db| {
        let light = load_visible_light(db, light_id, claims.sub)?;
        let uid = claims.sub.to_string();
        let sender = db.get_user_by_id(&uid)?.ok_or(ApiError::Unauthorized)?;
        let row = db.insert_message(&Uuid::new_v4().to_string(), &light.id, &uid, &text)?;
        let attendees = db.invitees_with_status(&light.id, &[InvitationStatus::Accepted])?;
        Ok((light, row, sender, attendees))
    })
    .await?;

    let message = row.into_message();
    let sender_name = sender.shown_name().to_string();
    let user = sender.summary();
    let notifier = Notifier::from_state(&state);

    let author = uuid_or_default(&light.author_id, "light author_id");
    if author != claims.sub {
        notifier
            .notify(
                author,
                &fanout::message_to_owner(light_id, &light.title, &sender_name, &message.message),
            )
            .await;
    }

    let attendees: Vec<Uuid> = attendees
        .iter()
        .map(|id| uuid_or_default(id, "invitation user_id"))
        .filter(|id| *id != claims.sub && *id != author)
        .collect();
    notifier
        .notify_all(
            &attendees,
            &fanout::message_to_attendee(light_id, &light.title, &sender_name, &message.message),
        )
        .await;

    state.dispatcher.broadcast(RealtimeEvent::MessageCreate {
        message: message.clone(),
        username: user.username.clone(),
    });

    Ok((StatusCode::CREATED, Json(MessageWithUser { message, user })))
}

/// Only the message's own author may edit it.
pub async fn edit_message(
    State(state): State<AppState>,
    Path((light_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<Json<LightMessage>> {
    let text = clean(&req.message)?;

    let row = blocking(&state, move |db| {
        let light = load_visible_light(db, light_id, claims.sub)?;
        let existing = db
            .get_message(&message_id.to_string())?
            .filter(|m| m.light_id == light.id)
            .ok_or(ApiError::NotFound)?;
        if existing.user_id != claims.sub.to_string() {
            return Err(ApiError::Forbidden);
        }
        db.update_message(&existing.id, &text)?.ok_or(ApiError::NotFound)
    })
    .await?;

    let message = row.into_message();
    state.dispatcher.broadcast(RealtimeEvent::MessageUpdate {
        message: message.clone(),
    });
    Ok(Json(message))
}

/// The message's author or the light's author may delete it.
pub async fn delete_message(
    State(state): State<AppState>,
    Path((light_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |db| {
        let light = load_visible_light(db, light_id, claims.sub)?;
        let uid = claims.sub.to_string();
        let existing = db
            .get_message(&message_id.to_string())?
            .filter(|m| m.light_id == light.id)
            .ok_or(ApiError::NotFound)?;
        if existing.user_id != uid && light.author_id != uid {
            return Err(ApiError::Forbidden);
        }
        db.delete_message(&existing.id)?;
        Ok(())
    })
    .await?;

    state
        .dispatcher
        .broadcast(RealtimeEvent::MessageDelete { light_id, message_id });
    Ok(StatusCode::NO_CONTENT)
}
