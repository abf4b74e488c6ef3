use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use greenlight_db::models::ReminderRow;
use greenlight_types::api::{
    Claims, NotificationCount, NotificationPage, UpdatePreferencesRequest,
};
use greenlight_types::models::{NotificationPreferences, Reminder, is_valid_lead_hours};

use crate::error::{ApiError, ApiResult};
use crate::reminders::reschedule_user;
use crate::state::{AppState, blocking};

const DEFAULT_PAGE: u32 = 20;
const MAX_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<NotificationPage>> {
    let limit = page.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let offset = page.offset.unwrap_or(0);

    let rows = blocking(&state, move |db| {
        Ok(db.list_notifications(&claims.sub.to_string(), limit, offset)?)
    })
    .await?;

    Ok(Json(NotificationPage {
        notifications: rows.into_iter().map(|r| r.into_notification()).collect(),
        limit,
        offset,
    }))
}

pub async fn count_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<NotificationCount>> {
    let (unread, total) =
        blocking(&state, move |db| Ok(db.notification_count(&claims.sub.to_string())?)).await?;
    Ok(Json(NotificationCount { unread, total }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |db| {
        if !db.mark_notification_read(&notification_id.to_string(), &claims.sub.to_string())? {
            return Err(ApiError::NotFound);
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = blocking(&state, move |db| {
        Ok(db.mark_all_notifications_read(&claims.sub.to_string())?)
    })
    .await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |db| {
        if !db.delete_notification(&notification_id.to_string(), &claims.sub.to_string())? {
            return Err(ApiError::NotFound);
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Preferences --

pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<NotificationPreferences>> {
    let prefs =
        blocking(&state, move |db| Ok(db.effective_preferences(&claims.sub.to_string())?)).await?;
    Ok(Json(prefs))
}

fn merge(mut prefs: NotificationPreferences, req: UpdatePreferencesRequest) -> ApiResult<NotificationPreferences> {
    if let Some(hours) = req.light_reminder_advance_hours {
        if !is_valid_lead_hours(hours) {
            return Err(ApiError::bad_request(
                "light_reminder_advance_hours must be one of 1, 2, 6, 12, 24",
            ));
        }
        prefs.light_reminder_advance_hours = hours;
    }
    if let Some(v) = req.light_invitation {
        prefs.light_invitation = v;
    }
    if let Some(v) = req.light_message_owner {
        prefs.light_message_owner = v;
    }
    if let Some(v) = req.light_message_attending {
        prefs.light_message_attending = v;
    }
    if let Some(v) = req.light_attending {
        prefs.light_attending = v;
    }
    if let Some(v) = req.light_reminder {
        prefs.light_reminder = v;
    }
    if let Some(v) = req.light_cancelled {
        prefs.light_cancelled = v;
    }
    if let Some(v) = req.system {
        prefs.system = v;
    }
    Ok(prefs)
}

/// Partial update. A change to the reminder toggle or lead time moves the
/// caller's pending reminders to match.
pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePreferencesRequest>,
) -> ApiResult<Json<NotificationPreferences>> {
    let prefs = blocking(&state, move |db| {
        let uid = claims.sub.to_string();
        let current = db.effective_preferences(&uid)?;
        let updated = merge(current.clone(), req)?;
        db.upsert_preferences(&uid, &updated)?;

        if updated.reminder_lead() != current.reminder_lead() {
            let moved = reschedule_user(db, &uid, &updated, Utc::now())?;
            info!("Reminder preference changed for {}; rescheduled {} reminders", uid, moved);
        }
        Ok(updated)
    })
    .await?;
    Ok(Json(prefs))
}

/// The caller's pending reminders, soonest first.
pub async fn list_my_reminders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Reminder>>> {
    let rows = blocking(&state, move |db| {
        Ok(db.unsent_reminders_for_user(&claims.sub.to_string())?)
    })
    .await?;
    Ok(Json(rows.into_iter().map(ReminderRow::into_reminder).collect()))
}
