//! Reminder scheduling and the periodic sweep.
//!
//! Reminders reach users along two paths. Accepting an invitation schedules
//! a row at `start - lead`; the sweep sends rows that have come due. The sweep
//! also scans, for every lead time, the lights starting about that far ahead
//! and picks out attendees whose preference matches. Both paths end in
//! [`dispatch_reminder`], which claims the `(user, light, lead)` reminder log
//! before notifying, so a reminder is sent at most once whichever path sees
//! it first.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use greenlight_db::Database;
use greenlight_db::models::{LightRow, ReminderRow, uuid_or_default};
use greenlight_db::queries::ReminderClaim;
use greenlight_db::time::fmt_ts;
use greenlight_types::api::SweepReport;
use greenlight_types::models::{InvitationStatus, NotificationPreferences, REMINDER_LEAD_HOURS};

use crate::fanout::{self, Notifier};
use crate::state::AppState;

// -- Scheduling (runs on the blocking pool) --

/// Schedule, move or drop `user_id`'s reminder for `light` under `prefs`.
/// Returns whether a reminder is now pending.
pub fn schedule_with_prefs(
    db: &Database,
    user_id: &str,
    light: &LightRow,
    prefs: &NotificationPreferences,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let Some(lead) = prefs.reminder_lead() else {
        db.delete_reminder(user_id, &light.id)?;
        return Ok(false);
    };

    let start = light.start();
    let reminder_time = start - Duration::hours(lead as i64);
    if reminder_time <= now {
        db.delete_reminder(user_id, &light.id)?;
        return Ok(false);
    }

    db.upsert_reminder(&ReminderRow {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        light_id: light.id.clone(),
        light_title: light.title.clone(),
        event_start_time: fmt_ts(start),
        reminder_time: fmt_ts(reminder_time),
        advance_hours: lead,
        sent: false,
        created_at: fmt_ts(now),
    })?;
    Ok(true)
}

/// Schedule under the user's stored preferences.
pub fn schedule_reminder(
    db: &Database,
    user_id: &str,
    light: &LightRow,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let prefs = db.effective_preferences(user_id)?;
    schedule_with_prefs(db, user_id, light, &prefs, now)
}

/// Recompute the unsent reminders of a light whose start time moved.
pub fn reschedule_light(db: &Database, light: &LightRow, now: DateTime<Utc>) -> anyhow::Result<usize> {
    let pending = db.unsent_reminders_for_light(&light.id)?;
    for row in &pending {
        schedule_reminder(db, &row.user_id, light, now)?;
    }
    Ok(pending.len())
}

/// Recompute a user's reminders for every upcoming light they attend.
pub fn reschedule_user(
    db: &Database,
    user_id: &str,
    prefs: &NotificationPreferences,
    now: DateTime<Utc>,
) -> anyhow::Result<usize> {
    let mut touched = 0;
    for invited in db.list_invited_lights(user_id)? {
        if invited.invitation.status() != InvitationStatus::Accepted {
            continue;
        }
        if invited.light.start() <= now {
            continue;
        }
        schedule_with_prefs(db, user_id, &invited.light, prefs, now)?;
        touched += 1;
    }
    Ok(touched)
}

// -- Sweep --

/// How one dispatch attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    /// Another dispatch already owns the key, or the user opted out.
    Skipped,
    Failed,
}

async fn on_db<F, T>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db)).await?
}

/// Claim the `(user, light, lead)` log and, if this caller won it, notify.
pub async fn dispatch_reminder(
    db: &Arc<Database>,
    notifier: &Notifier,
    user_id: &str,
    light: &LightRow,
    lead: u32,
    now: DateTime<Utc>,
) -> Dispatch {
    let claim = ReminderClaim {
        user_id: user_id.to_string(),
        light_id: light.id.clone(),
        light_title: light.title.clone(),
        advance_hours: lead,
        event_start_time: light.start_time.clone(),
        sent_at: fmt_ts(now),
    };

    let log_id = match on_db(db, move |db| db.claim_reminder_log(&claim)).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            debug!("Reminder {}h for {} on light {} already claimed", lead, user_id, light.id);
            return Dispatch::Skipped;
        }
        Err(e) => {
            warn!("Failed to claim reminder for {} on light {}: {:#}", user_id, light.id, e);
            return Dispatch::Failed;
        }
    };

    let recipient = uuid_or_default(user_id, "reminder user_id");
    let light_id = uuid_or_default(&light.id, "light id");
    let out = fanout::reminder(light_id, &light.title, light.start(), lead);

    match notifier.try_notify(recipient, &out).await {
        Ok(Some(notification)) => {
            let nid = notification.id.to_string();
            let lid = log_id.clone();
            if let Err(e) = on_db(db, move |db| db.complete_reminder_log(&lid, &nid)).await {
                warn!("Reminder sent but log {} not completed: {:#}", log_id, e);
            }
            Dispatch::Sent
        }
        Ok(None) => {
            // Opted out since scheduling: leave no trace in the audit log.
            let (uid, light_row_id) = (user_id.to_string(), light.id.clone());
            let released = on_db(db, move |db| {
                db.release_reminder_log(&log_id)?;
                db.mark_reminder_sent(&uid, &light_row_id)
            })
            .await;
            if let Err(e) = released {
                warn!("Failed to release suppressed reminder claim: {:#}", e);
            }
            Dispatch::Skipped
        }
        Err(e) => {
            warn!("Failed to send reminder to {} for light {}: {:#}", user_id, light.id, e);
            if let Err(e) = on_db(db, move |db| db.release_reminder_log(&log_id)).await {
                warn!("Failed to release reminder claim: {:#}", e);
            }
            Dispatch::Failed
        }
    }
}

fn tally(report: &mut SweepReport, outcome: Dispatch) {
    match outcome {
        Dispatch::Sent => report.sent += 1,
        Dispatch::Skipped => report.skipped += 1,
        Dispatch::Failed => report.failed += 1,
    }
}

/// Run both reminder paths once.
pub async fn run_sweep(state: &AppState) -> anyhow::Result<SweepReport> {
    run_sweep_at(state, Utc::now()).await
}

pub async fn run_sweep_at(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<SweepReport> {
    let db = &state.db;
    let notifier = Notifier::from_state(state);
    let mut report = SweepReport::default();

    // Path 1: scheduled rows that have come due.
    let now_ts = fmt_ts(now);
    let due = on_db(db, move |db| db.due_reminders(&now_ts)).await?;
    report.scheduled_due = due.len();

    for row in due {
        let light_id = row.light_id.clone();
        let light = match on_db(db, move |db| db.get_light(&light_id)).await {
            Ok(Some(light)) => light,
            Ok(None) => {
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!("Failed to load light {} for reminder: {:#}", row.light_id, e);
                report.failed += 1;
                continue;
            }
        };

        if light.start() <= now {
            debug!("Reminder for {} on light {} is stale, marking sent", row.user_id, light.id);
            let (uid, lid) = (row.user_id.clone(), light.id.clone());
            if let Err(e) = on_db(db, move |db| db.mark_reminder_sent(&uid, &lid)).await {
                warn!("Failed to retire stale reminder: {:#}", e);
            }
            report.skipped += 1;
            continue;
        }

        let outcome = dispatch_reminder(db, &notifier, &row.user_id, &light, row.advance_hours, now).await;
        if outcome == Dispatch::Skipped {
            // The lead-time scan got there first; retire the row.
            let (uid, lid) = (row.user_id.clone(), light.id.clone());
            if let Err(e) = on_db(db, move |db| db.mark_reminder_sent(&uid, &lid)).await {
                warn!("Failed to retire claimed reminder: {:#}", e);
            }
        }
        tally(&mut report, outcome);
    }

    // Path 2: lights starting one lead time from now, within the sweep window.
    let window = Duration::from_std(state.sweep_window).unwrap_or_else(|_| Duration::minutes(5));
    for lead in REMINDER_LEAD_HOURS {
        let from = now + Duration::hours(lead as i64);
        let to = from + window;
        let lights = on_db(db, move |db| db.list_lights_starting_between(from, to)).await?;

        for light in lights {
            let lid = light.id.clone();
            let candidates = match on_db(db, move |db| db.reminder_candidates(&lid)).await {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to load attendees of light {}: {:#}", light.id, e);
                    report.failed += 1;
                    continue;
                }
            };

            for (user_id, prefs) in candidates {
                if prefs.reminder_lead() != Some(lead) {
                    continue;
                }
                report.lead_time_matches += 1;
                let outcome = dispatch_reminder(db, &notifier, &user_id, &light, lead, now).await;
                tally(&mut report, outcome);
            }
        }
    }

    info!(
        "Reminder sweep: {} due, {} lead-time matches, {} sent, {} skipped, {} failed",
        report.scheduled_due, report.lead_time_matches, report.sent, report.skipped, report.failed
    );
    Ok(report)
}
