use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use greenlight_db::models::{InvitationRow, LightRow, uuid_or_default};
use greenlight_db::queries::StatusChange;
use greenlight_types::api::{
    Claims, InvitationWithUser, InviteRequest, InviteResponse, RespondRequest,
};
use greenlight_types::events::RealtimeEvent;
use greenlight_types::models::{Invitation, InvitationStatus};

use crate::error::{ApiError, ApiResult};
use crate::fanout::{self, Notifier};
use crate::lights::{load_owned_light, load_visible_light};
use crate::reminders::schedule_reminder;
use crate::state::{AppState, blocking};

/// Bulk-invite flow shared by light creation and the invite endpoint.
///
/// Targets are the members of the listed friend-lists the author owns plus
/// the individually named users. Duplicates, the author and anyone already
/// invited are dropped before the insert.
pub(crate) async fn invite_users(
    state: &AppState,
    claims: &Claims,
    light: &LightRow,
    req: InviteRequest,
) -> ApiResult<InviteResponse> {
    let author_id = claims.sub.to_string();
    let light_id = light.id.clone();

    let (created, already_invited, author_name) = blocking(state, move |db| {
        let list_ids: Vec<String> = req.list_ids.iter().map(Uuid::to_string).collect();
        let mut targets = db.members_of_owned_lists(&author_id, &list_ids)?;
        let named: Vec<String> = req.user_ids.iter().map(Uuid::to_string).collect();
        targets.extend(db.existing_user_ids(&named)?);

        let mut seen = HashSet::new();
        targets.retain(|id| *id != author_id && seen.insert(id.clone()));

        let already = db.invited_user_ids(&light_id)?;
        let fresh: Vec<String> = targets.iter().filter(|id| !already.contains(*id)).cloned().collect();
        let inserted = db.insert_invitations(&light_id, &fresh)?;
        let already_invited = targets.len() - inserted.len();

        let mut created = Vec::with_capacity(inserted.len());
        for user_id in &inserted {
            if let Some(inv) = db.get_invitation_for(&light_id, user_id)? {
                created.push(inv);
            }
        }

        let author_name = db
            .get_user_by_id(&author_id)?
            .map(|u| u.shown_name().to_string())
            .unwrap_or_default();
        Ok((created, already_invited, author_name))
    })
    .await?;

    let light_uuid = uuid_or_default(&light.id, "light id");
    let invited: Vec<Uuid> = created
        .iter()
        .map(|inv| uuid_or_default(&inv.user_id, "invitation user_id"))
        .collect();

    info!(
        "{} invited {} users to light {} ({} already invited)",
        claims.username,
        invited.len(),
        light.id,
        already_invited
    );

    Notifier::from_state(state)
        .notify_all(&invited, &fanout::invitation(light_uuid, &light.title, &author_name))
        .await;
    for inv in created {
        publish_update(state, &inv.into_invitation()).await;
    }

    Ok(InviteResponse {
        invited,
        already_invited,
    })
}

/// Tell the light's followers and the invitee about an RSVP change.
async fn publish_update(state: &AppState, inv: &Invitation) {
    let event = RealtimeEvent::InvitationUpdate {
        light_id: inv.light_id,
        invitation_id: inv.id,
        user_id: inv.user_id,
        status: Some(inv.status),
    };
    state.dispatcher.send_to_user(inv.user_id, event.clone()).await;
    state.dispatcher.broadcast(event);
}

/// The single status transition used by both the invitee and the author.
///
/// Accepting needs a running light with room left. Entering `accepted`
/// schedules the invitee's reminder and tells the author; leaving it drops
/// the reminder. Re-sending the current status is a silent no-op.
async fn transition(
    state: &AppState,
    light: LightRow,
    invitation: InvitationRow,
    status: InvitationStatus,
) -> ApiResult<Invitation> {
    if invitation.status() == status {
        return Ok(invitation.into_invitation());
    }

    let now = Utc::now();
    if status == InvitationStatus::Accepted && light.end() < now {
        return Err(ApiError::conflict("light has already ended"));
    }

    let light_for_db = light.clone();
    let (updated, changed, attendee_name) = blocking(state, move |db| {
        let light = light_for_db;
        let change = db.set_invitation_status(&invitation.id, status, light.max_limit)?;
        let previous = match change {
            StatusChange::Missing => return Err(ApiError::NotFound),
            StatusChange::Full => return Err(ApiError::conflict("light is full")),
            StatusChange::Unchanged => return Ok((invitation, false, None)),
            StatusChange::Changed { previous } => previous,
        };

        let mut attendee_name = None;
        if status == InvitationStatus::Accepted {
            schedule_reminder(db, &invitation.user_id, &light, now)?;
            attendee_name = db
                .get_user_by_id(&invitation.user_id)?
                .map(|u| u.shown_name().to_string());
        } else if previous == InvitationStatus::Accepted {
            db.delete_reminder(&invitation.user_id, &light.id)?;
        }

        let updated = db.get_invitation(&invitation.id)?.ok_or(ApiError::NotFound)?;
        Ok((updated, true, attendee_name))
    })
    .await?;

    let invitation = updated.into_invitation();
    if !changed {
        return Ok(invitation);
    }
    if let Some(name) = attendee_name {
        let author = uuid_or_default(&light.author_id, "light author_id");
        Notifier::from_state(state)
            .notify(author, &fanout::attending(invitation.light_id, &light.title, &name))
            .await;
    }
    publish_update(state, &invitation).await;
    Ok(invitation)
}

// -- Handlers --

pub async fn invite(
    State(state): State<AppState>,
    Path(light_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<Json<InviteResponse>> {
    let uid = claims.sub;
    let light = blocking(&state, move |db| load_owned_light(db, light_id, uid)).await?;
    Ok(Json(invite_users(&state, &claims, &light, req).await?))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    Path(light_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<InvitationWithUser>>> {
    let rows = blocking(&state, move |db| {
        let light = load_visible_light(db, light_id, claims.sub)?;
        Ok(db.list_invitations(&light.id)?)
    })
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(|(inv, user)| InvitationWithUser {
                invitation: inv.into_invitation(),
                user: user.into_summary(),
            })
            .collect(),
    ))
}

/// The invitee accepts or declines their own invitation.
pub async fn respond(
    State(state): State<AppState>,
    Path(light_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RespondRequest>,
) -> ApiResult<Json<Invitation>> {
    if req.status == InvitationStatus::Pending {
        return Err(ApiError::bad_request("status must be accepted or declined"));
    }

    let (light, invitation) = blocking(&state, move |db| {
        let light = load_visible_light(db, light_id, claims.sub)?;
        let invitation = db
            .get_invitation_for(&light.id, &claims.sub.to_string())?
            .ok_or(ApiError::NotFound)?;
        Ok((light, invitation))
    })
    .await?;

    Ok(Json(transition(&state, light, invitation, req.status).await?))
}

/// The author sets the status of any invitation on their light.
pub async fn set_status(
    State(state): State<AppState>,
    Path((light_id, invitation_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RespondRequest>,
) -> ApiResult<Json<Invitation>> {
    let (light, invitation) = blocking(&state, move |db| {
        let light = load_owned_light(db, light_id, claims.sub)?;
        let invitation = db
            .get_invitation(&invitation_id.to_string())?
            .filter(|inv| inv.light_id == light.id)
            .ok_or(ApiError::NotFound)?;
        Ok((light, invitation))
    })
    .await?;

    Ok(Json(transition(&state, light, invitation, req.status).await?))
}

pub async fn remove_invitation(
    State(state): State<AppState>,
    Path((light_id, invitation_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let invitation = blocking(&state, move |db| {
        let light = load_owned_light(db, light_id, claims.sub)?;
        let invitation = db
            .get_invitation(&invitation_id.to_string())?
            .filter(|inv| inv.light_id == light.id)
            .ok_or(ApiError::NotFound)?;
        db.delete_invitation(&invitation.id)?;
        db.delete_reminder(&invitation.user_id, &light.id)?;
        Ok(invitation)
    })
    .await?;

    let user_id = uuid_or_default(&invitation.user_id, "invitation user_id");
    let event = RealtimeEvent::InvitationUpdate {
        light_id,
        invitation_id,
        user_id,
        status: None,
    };
    state.dispatcher.send_to_user(user_id, event.clone()).await;
    state.dispatcher.broadcast(event);

    Ok(StatusCode::NO_CONTENT)
}
