//! Cron, admin and diagnostic endpoints, plus the health check.

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::info;

use greenlight_db::models::{ReminderLogRow, uuid_or_default};
use greenlight_types::api::{
    ReminderLogPage, SweepResponse, SystemNotificationRequest, SystemNotificationResponse,
    UpcomingEvent, UpcomingEventsResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::fanout::{self, Notifier};
use crate::reminders::run_sweep;
use crate::state::{AppState, blocking};

const DEFAULT_LOG_PAGE: u32 = 100;
const MAX_LOG_PAGE: u32 = 500;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn sweep(state: &AppState, message: &str) -> ApiResult<Json<SweepResponse>> {
    let report = run_sweep(state).await?;
    Ok(Json(SweepResponse {
        success: true,
        message: message.to_string(),
        timestamp: Utc::now(),
        report,
    }))
}

/// Scheduler entry point.
pub async fn cron_reminders(State(state): State<AppState>) -> ApiResult<Json<SweepResponse>> {
    info!("Reminder sweep triggered by cron");
    sweep(&state, "Reminders processed successfully").await
}

/// Same sweep, for poking from a browser.
pub async fn manual_reminders(State(state): State<AppState>) -> ApiResult<Json<SweepResponse>> {
    info!("Reminder sweep triggered manually");
    sweep(&state, "Manual reminder processing completed").await
}

/// Sends a `system` notification to each listed user, honouring their preferences.
pub async fn system_notification(
    State(state): State<AppState>,
    Json(req): Json<SystemNotificationRequest>,
) -> ApiResult<Json<SystemNotificationResponse>> {
    let title = req.title.trim();
    let message = req.message.trim();
    if title.is_empty() || message.is_empty() {
        return Err(ApiError::bad_request("title and message are required"));
    }
    if req.user_ids.is_empty() {
        return Err(ApiError::bad_request("user_ids must not be empty"));
    }

    let out = fanout::system(title, message, req.data);
    let summary = Notifier::from_state(&state).notify_all(&req.user_ids, &out).await;
    Ok(Json(SystemNotificationResponse {
        sent: summary.sent,
        suppressed: summary.suppressed,
        failed: summary.failed,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    #[serde(rename = "type")]
    pub reminder_type: Option<String>,
    pub user_id: Option<String>,
}

pub async fn reminder_logs(
    State(state): State<AppState>,
    Query(q): Query<LogQuery>,
) -> ApiResult<Json<ReminderLogPage>> {
    let limit = q.limit.unwrap_or(DEFAULT_LOG_PAGE).clamp(1, MAX_LOG_PAGE);
    let offset = q.offset.unwrap_or(0);

    let rows = blocking(&state, move |db| {
        Ok(db.list_reminder_logs(limit, offset, q.reminder_type.as_deref(), q.user_id.as_deref())?)
    })
    .await?;

    let logs: Vec<_> = rows.into_iter().map(ReminderLogRow::into_log).collect();
    Ok(Json(ReminderLogPage {
        count: logs.len(),
        logs,
        limit,
        offset,
    }))
}

/// Published lights starting within the next day, for checking what the
/// lead-time scan is about to see.
pub async fn upcoming_events(State(state): State<AppState>) -> ApiResult<Json<UpcomingEventsResponse>> {
    let now = Utc::now();
    let rows = blocking(&state, move |db| {
        let mut out = Vec::new();
        for light in db.list_lights_starting_between(now, now + Duration::hours(24))? {
            let counts = db.invitation_counts(&light.id)?;
            out.push((light, counts.accepted));
        }
        Ok(out)
    })
    .await?;

    let events: Vec<UpcomingEvent> = rows
        .into_iter()
        .map(|(light, accepted_attendees)| {
            let start = light.start();
            let until_ms = (start - now).num_milliseconds();
            UpcomingEvent {
                id: uuid_or_default(&light.id, "light id"),
                title: light.title,
                start_time: start,
                published: light.published,
                time_until_event: format!("{:.2} hours", until_ms as f64 / 3_600_000.0),
                time_until_event_ms: until_ms,
                accepted_attendees,
            }
        })
        .collect();

    Ok(Json(UpcomingEventsResponse {
        current_time: now,
        events_found: events.len(),
        events,
    }))
}
