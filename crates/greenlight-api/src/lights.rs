use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use greenlight_db::Database;
use greenlight_db::models::LightRow;
use greenlight_db::time::fmt_ts;
use greenlight_types::api::{
    Claims, CreateLightRequest, LightDetail, LightWithStatus, UpdateLightRequest,
};
use greenlight_types::events::RealtimeEvent;
use greenlight_types::models::{InvitationStatus, Light};

use crate::error::{ApiError, ApiResult};
use crate::fanout::{self, Notifier};
use crate::invitations::invite_users;
use crate::reminders::reschedule_light;
use crate::state::{AppState, blocking};

// -- Access helpers (blocking) --

fn load_light(db: &Database, light_id: Uuid) -> ApiResult<LightRow> {
    db.get_light(&light_id.to_string())?.ok_or(ApiError::NotFound)
}

/// The light if `user_id` is its author or an invitee; 404 otherwise.
pub(crate) fn load_visible_light(db: &Database, light_id: Uuid, user_id: Uuid) -> ApiResult<LightRow> {
    let light = load_light(db, light_id)?;
    if !db.can_view_light(&light.id, &user_id.to_string())? {
        return Err(ApiError::NotFound);
    }
    Ok(light)
}

/// The light if `user_id` authored it; 403 for viewers, 404 for everyone else.
pub(crate) fn load_owned_light(db: &Database, light_id: Uuid, user_id: Uuid) -> ApiResult<LightRow> {
    let light = load_visible_light(db, light_id, user_id)?;
    if light.author_id != user_id.to_string() {
        return Err(ApiError::Forbidden);
    }
    Ok(light)
}

fn validate(
    title: &str,
    location: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_limit: Option<u32>,
) -> ApiResult<()> {
    if title.trim().is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }
    if location.trim().is_empty() {
        return Err(ApiError::bad_request("location is required"));
    }
    if end <= start {
        return Err(ApiError::bad_request("end_time must be after start_time"));
    }
    if max_limit == Some(0) {
        return Err(ApiError::bad_request("max_limit must be at least 1"));
    }
    Ok(())
}

// -- Handlers --

pub async fn create_light(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateLightRequest>,
) -> ApiResult<impl IntoResponse> {
    validate(&req.title, &req.location, req.start_time, req.end_time, req.max_limit)?;

    let now = fmt_ts(Utc::now());
    let row = LightRow {
        id: Uuid::new_v4().to_string(),
        author_id: claims.sub.to_string(),
        title: req.title.trim().to_string(),
        description: req.description,
        location: req.location.trim().to_string(),
        start_time: fmt_ts(req.start_time),
        end_time: fmt_ts(req.end_time),
        max_limit: req.max_limit,
        image_url: req.image_url,
        published: req.published,
        created_at: now.clone(),
        updated_at: now,
    };

    let inserted = row.clone();
    blocking(&state, move |db| Ok(db.insert_light(&inserted)?)).await?;
    info!("{} created light {} ({})", claims.username, row.id, row.title);

    if let Some(invite) = req.invite.filter(|i| !i.is_empty()) {
        invite_users(&state, &claims, &row, invite).await?;
    }

    Ok((StatusCode::CREATED, Json(row.into_light())))
}

pub async fn get_light(
    State(state): State<AppState>,
    Path(light_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<LightDetail>> {
    let detail = blocking(&state, move |db| {
        let light = load_visible_light(db, light_id, claims.sub)?;
        let author = db
            .get_user_by_id(&light.author_id)?
            .ok_or_else(|| anyhow::anyhow!("author of light {} missing", light.id))?;
        let counts = db.invitation_counts(&light.id)?;
        let my_status = if light.author_id == claims.sub.to_string() {
            None
        } else {
            db.get_invitation_for(&light.id, &claims.sub.to_string())?
                .map(|inv| inv.status())
        };
        Ok(LightDetail {
            light: light.into_light(),
            author: author.summary(),
            counts,
            my_status,
        })
    })
    .await?;
    Ok(Json(detail))
}

pub async fn update_light(
    State(state): State<AppState>,
    Path(light_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateLightRequest>,
) -> ApiResult<Json<Light>> {
    let light = blocking(&state, move |db| {
        let mut light = load_owned_light(db, light_id, claims.sub)?;
        let old_start = light.start();

        let start = req.start_time.unwrap_or(old_start);
        let end = req.end_time.unwrap_or_else(|| light.end());
        if let Some(title) = req.title {
            light.title = title.trim().to_string();
        }
        if let Some(location) = req.location {
            light.location = location.trim().to_string();
        }
        if let Some(description) = req.description {
            light.description = description;
        }
        if let Some(max_limit) = req.max_limit {
            light.max_limit = max_limit;
        }
        if let Some(image_url) = req.image_url {
            light.image_url = image_url;
        }
        if let Some(published) = req.published {
            light.published = published;
        }
        validate(&light.title, &light.location, start, end, light.max_limit)?;

        let now = Utc::now();
        light.start_time = fmt_ts(start);
        light.end_time = fmt_ts(end);
        light.updated_at = fmt_ts(now);
        if !db.update_light(&light)? {
            return Err(ApiError::NotFound);
        }

        if start != old_start {
            let moved = reschedule_light(db, &light, now)?;
            info!("Light {} moved; recomputed {} reminders", light.id, moved);
        }
        Ok(light)
    })
    .await?;
    Ok(Json(light.into_light()))
}

/// Cancels a light: invitees who had not declined are told, then the light
/// and everything hanging off it is deleted.
pub async fn delete_light(
    State(state): State<AppState>,
    Path(light_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let actor = claims.clone();
    let (light, author_name, recipients) = blocking(&state, move |db| {
        let light = load_owned_light(db, light_id, actor.sub)?;
        let recipients = db.invitees_with_status(
            &light.id,
            &[InvitationStatus::Pending, InvitationStatus::Accepted],
        )?;
        let author_name = db
            .get_user_by_id(&light.author_id)?
            .map(|u| u.shown_name().to_string())
            .unwrap_or(actor.username);
        db.delete_light(&light.id)?;
        Ok((light, author_name, recipients))
    })
    .await?;

    info!("{} cancelled light {} ({})", claims.username, light.id, light.title);

    let recipients: Vec<Uuid> = recipients.iter().filter_map(|id| id.parse().ok()).collect();
    Notifier::from_state(&state)
        .notify_all(&recipients, &fanout::cancelled(light_id, &light.title, &author_name))
        .await;
    state.dispatcher.broadcast(RealtimeEvent::LightCancelled { light_id });

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_my_lights(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Light>>> {
    let rows = blocking(&state, move |db| Ok(db.list_lights_by_author(&claims.sub.to_string())?)).await?;
    Ok(Json(rows.into_iter().map(LightRow::into_light).collect()))
}

/// Lights the caller is invited to or hosts that have not ended yet.
pub async fn list_active_lights(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<LightWithStatus>>> {
    let now = Utc::now();
    let mut entries = blocking(&state, move |db| {
        let uid = claims.sub.to_string();
        let mut entries = invited_entries(db, &uid)?;

        let me = db.get_user_by_id(&uid)?.ok_or(ApiError::Unauthorized)?;
        for light in db.list_lights_by_author(&uid)? {
            entries.push(LightWithStatus {
                invitation_id: None,
                status: InvitationStatus::Accepted,
                is_owner: true,
                light: light.into_light(),
                author: me.summary(),
            });
        }
        Ok(entries)
    })
    .await?;

    entries.retain(|e| !e.light.has_ended(now));
    entries.sort_by(|a, b| b.light.end_time.cmp(&a.light.end_time));
    Ok(Json(entries))
}

/// Invitations whose light has already ended.
pub async fn list_past_lights(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<LightWithStatus>>> {
    let now = Utc::now();
    let mut entries =
        blocking(&state, move |db| invited_entries(db, &claims.sub.to_string())).await?;

    entries.retain(|e| e.light.has_ended(now));
    entries.sort_by(|a, b| b.light.end_time.cmp(&a.light.end_time));
    Ok(Json(entries))
}

fn invited_entries(db: &Database, user_id: &str) -> ApiResult<Vec<LightWithStatus>> {
    Ok(db
        .list_invited_lights(user_id)?
        .into_iter()
        .map(|row| {
            let status = row.invitation.status();
            let invitation = row.invitation.into_invitation();
            LightWithStatus {
                invitation_id: Some(invitation.id),
                status,
                is_owner: false,
                light: row.light.into_light(),
                author: row.author.into_summary(),
            }
        })
        .collect())
}
