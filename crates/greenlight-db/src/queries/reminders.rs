use anyhow::Result;
use uuid::Uuid;

use greenlight_types::models::NotificationPreferences;

use super::preferences::map_preferences;
use crate::Database;
use crate::models::{ReminderLogRow, ReminderRow};

const REMINDER_COLS: &str = "id, user_id, light_id, light_title, event_start_time, reminder_time, \
     advance_hours, sent, created_at";

const LOG_COLS: &str = "id, user_id, light_id, notification_id, reminder_type, light_title, \
     advance_hours, event_start_time, sent_at";

/// The `(user, light, lead)` key a dispatcher must own before notifying.
#[derive(Debug, Clone)]
pub struct ReminderClaim {
    pub user_id: String,
    pub light_id: String,
    pub light_title: String,
    pub advance_hours: u32,
    pub event_start_time: String,
    pub sent_at: String,
}

impl ReminderClaim {
    pub fn reminder_type(&self) -> String {
        format!("{}h", self.advance_hours)
    }
}

impl Database {
    // -- Scheduled reminders --

    /// Schedules the reminder for `(user_id, light_id)`, replacing any earlier
    /// schedule and clearing its sent flag.
    pub fn upsert_reminder(&self, r: &ReminderRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reminders (id, user_id, light_id, light_title, event_start_time,
                                        reminder_time, advance_hours, sent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
                 ON CONFLICT(user_id, light_id) DO UPDATE SET
                     light_title = excluded.light_title,
                     event_start_time = excluded.event_start_time,
                     reminder_time = excluded.reminder_time,
                     advance_hours = excluded.advance_hours,
                     sent = 0",
                rusqlite::params![
                    r.id,
                    r.user_id,
                    r.light_id,
                    r.light_title,
                    r.event_start_time,
                    r.reminder_time,
                    r.advance_hours
                ],
            )?;
            Ok(())
        })
    }

    pub fn delete_reminder(&self, user_id: &str, light_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM reminders WHERE user_id = ?1 AND light_id = ?2",
                [user_id, light_id],
            )?;
            Ok(n == 1)
        })
    }

    /// Unsent reminders whose time has come, oldest first.
    pub fn due_reminders(&self, now: &str) -> Result<Vec<ReminderRow>> {
        self.query_reminders("WHERE sent = 0 AND reminder_time <= ?1", now)
    }

    pub fn unsent_reminders_for_user(&self, user_id: &str) -> Result<Vec<ReminderRow>> {
        self.query_reminders("WHERE sent = 0 AND user_id = ?1", user_id)
    }

    pub fn unsent_reminders_for_light(&self, light_id: &str) -> Result<Vec<ReminderRow>> {
        self.query_reminders("WHERE sent = 0 AND light_id = ?1", light_id)
    }

    pub fn mark_reminder_sent(&self, user_id: &str, light_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE reminders SET sent = 1 WHERE user_id = ?1 AND light_id = ?2",
                [user_id, light_id],
            )?;
            Ok(n == 1)
        })
    }

    fn query_reminders(&self, filter: &str, arg: &str) -> Result<Vec<ReminderRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM reminders {} ORDER BY reminder_time, rowid",
                REMINDER_COLS, filter
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([arg], map_reminder)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Accepted attendees of a light with their effective preferences.
    pub fn reminder_candidates(&self, light_id: &str) -> Result<Vec<(String, NotificationPreferences)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT i.user_id,
                        COALESCE(p.light_invitation, 1), COALESCE(p.light_message_owner, 1),
                        COALESCE(p.light_message_attending, 1), COALESCE(p.light_attending, 1),
                        COALESCE(p.light_reminder, 1), COALESCE(p.light_reminder_advance_hours, 1),
                        COALESCE(p.light_cancelled, 1), COALESCE(p.system, 1)
                 FROM light_invitations i
                 LEFT JOIN notification_preferences p ON p.user_id = i.user_id
                 WHERE i.light_id = ?1 AND i.status = 'accepted'
                 ORDER BY i.created_at",
            )?;
            let rows = stmt
                .query_map([light_id], |row| Ok((row.get(0)?, map_preferences(row, 1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Reminder logs --

    /// Inserts the log row for `claim` unless one already exists for the same
    /// `(user, light, lead)`. Returns the new log id when this caller won.
    pub fn claim_reminder_log(&self, claim: &ReminderClaim) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let id = Uuid::new_v4().to_string();
            let n = conn.execute(
                "INSERT OR IGNORE INTO reminder_logs (id, user_id, light_id, reminder_type,
                                                      light_title, advance_hours,
                                                      event_start_time, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id,
                    claim.user_id,
                    claim.light_id,
                    claim.reminder_type(),
                    claim.light_title,
                    claim.advance_hours,
                    claim.event_start_time,
                    claim.sent_at
                ],
            )?;
            Ok((n == 1).then_some(id))
        })
    }

    /// Records the notification on a claimed log and marks the matching
    /// scheduled reminder sent.
    pub fn complete_reminder_log(&self, log_id: &str, notification_id: &str) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE reminder_logs SET notification_id = ?2 WHERE id = ?1",
                [log_id, notification_id],
            )?;
            tx.execute(
                "UPDATE reminders SET sent = 1
                 WHERE sent = 0 AND (user_id, light_id) IN
                       (SELECT user_id, light_id FROM reminder_logs WHERE id = ?1)",
                [log_id],
            )?;
            Ok(())
        })
    }

    /// Drops a claim whose notification could not be written, so a later
    /// sweep may try again.
    pub fn release_reminder_log(&self, log_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM reminder_logs WHERE id = ?1 AND notification_id IS NULL",
                [log_id],
            )?;
            Ok(n == 1)
        })
    }

    /// Reminder logs, newest first, optionally filtered by type and user.
    pub fn list_reminder_logs(
        &self,
        limit: u32,
        offset: u32,
        reminder_type: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Vec<ReminderLogRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM reminder_logs
                 WHERE (?1 IS NULL OR reminder_type = ?1) AND (?2 IS NULL OR user_id = ?2)
                 ORDER BY sent_at DESC, rowid DESC
                 LIMIT ?3 OFFSET ?4",
                LOG_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![reminder_type, user_id, limit, offset], |row| {
                    Ok(ReminderLogRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        light_id: row.get(2)?,
                        notification_id: row.get(3)?,
                        reminder_type: row.get(4)?,
                        light_title: row.get(5)?,
                        advance_hours: row.get(6)?,
                        event_start_time: row.get(7)?,
                        sent_at: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_reminder(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReminderRow> {
    Ok(ReminderRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        light_id: row.get(2)?,
        light_title: row.get(3)?,
        event_start_time: row.get(4)?,
        reminder_time: row.get(5)?,
        advance_hours: row.get(6)?,
        sent: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use greenlight_types::models::{InvitationStatus, NotificationPreferences};

    use super::ReminderClaim;
    use crate::Database;
    use crate::models::{LightRow, ReminderRow};
    use crate::queries::fixtures;
    use crate::time::fmt_ts;

    fn reminder_for(user_id: &str, light: &LightRow, hours: u32) -> ReminderRow {
        let at = light.start() - Duration::hours(hours as i64);
        ReminderRow {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            light_id: light.id.clone(),
            light_title: light.title.clone(),
            event_start_time: light.start_time.clone(),
            reminder_time: fmt_ts(at),
            advance_hours: hours,
            sent: false,
            created_at: fmt_ts(Utc::now()),
        }
    }

    fn claim_for(user_id: &str, light: &LightRow, hours: u32) -> ReminderClaim {
        ReminderClaim {
            user_id: user_id.to_string(),
            light_id: light.id.clone(),
            light_title: light.title.clone(),
            advance_hours: hours,
            event_start_time: light.start_time.clone(),
            sent_at: fmt_ts(Utc::now()),
        }
    }

    #[test]
    fn test_upsert_keeps_one_row_per_user_and_light() {
        let db = Database::open_in_memory().unwrap();
        let ada = fixtures::user(&db, "ada");
        let bob = fixtures::user(&db, "bob");
        let light = fixtures::light(&db, &ada);

        db.upsert_reminder(&reminder_for(&bob, &light, 1)).unwrap();
        db.mark_reminder_sent(&bob, &light.id).unwrap();
        db.upsert_reminder(&reminder_for(&bob, &light, 6)).unwrap();

        let rows = db.unsent_reminders_for_user(&bob).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].advance_hours, 6);
        assert!(!rows[0].sent);

        assert!(db.delete_reminder(&bob, &light.id).unwrap());
        assert!(db.unsent_reminders_for_light(&light.id).unwrap().is_empty());
    }

    #[test]
    fn test_due_reminders_respect_time_and_sent() {
        let db = Database::open_in_memory().unwrap();
        let ada = fixtures::user(&db, "ada");
        let bob = fixtures::user(&db, "bob");
        let cy = fixtures::user(&db, "cy");
        let soon = fixtures::light_at(&db, &ada, Utc::now() + Duration::minutes(30), 1);
        let later = fixtures::light_at(&db, &ada, Utc::now() + Duration::days(3), 1);

        db.upsert_reminder(&reminder_for(&bob, &soon, 1)).unwrap();
        db.upsert_reminder(&reminder_for(&cy, &soon, 1)).unwrap();
        db.upsert_reminder(&reminder_for(&bob, &later, 1)).unwrap();
        db.mark_reminder_sent(&cy, &soon.id).unwrap();

        let due = db.due_reminders(&fmt_ts(Utc::now())).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].user_id, bob);
        assert_eq!(due[0].light_id, soon.id);
    }

    #[test]
    fn test_claim_is_won_once() {
        let db = Database::open_in_memory().unwrap();
        let ada = fixtures::user(&db, "ada");
        let bob = fixtures::user(&db, "bob");
        let light = fixtures::light(&db, &ada);
        db.upsert_reminder(&reminder_for(&bob, &light, 1)).unwrap();

        let claim = claim_for(&bob, &light, 1);
        let log_id = db.claim_reminder_log(&claim).unwrap().unwrap();
        assert!(db.claim_reminder_log(&claim).unwrap().is_none());
        // A different lead is a different key.
        assert!(db.claim_reminder_log(&claim_for(&bob, &light, 2)).unwrap().is_some());

        db.complete_reminder_log(&log_id, "n1").unwrap();
        assert!(db.unsent_reminders_for_user(&bob).unwrap().is_empty());
        // Completed claims are never released.
        assert!(!db.release_reminder_log(&log_id).unwrap());

        let logs = db.list_reminder_logs(10, 0, Some("1h"), None).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].notification_id.as_deref(), Some("n1"));
    }

    #[test]
    fn test_released_claim_can_be_retried() {
        let db = Database::open_in_memory().unwrap();
        let ada = fixtures::user(&db, "ada");
        let bob = fixtures::user(&db, "bob");
        let light = fixtures::light(&db, &ada);

        let claim = claim_for(&bob, &light, 12);
        let log_id = db.claim_reminder_log(&claim).unwrap().unwrap();
        assert!(db.release_reminder_log(&log_id).unwrap());
        assert!(db.claim_reminder_log(&claim).unwrap().is_some());
    }

    #[test]
    fn test_logs_survive_light_deletion() {
        let db = Database::open_in_memory().unwrap();
        let ada = fixtures::user(&db, "ada");
        let bob = fixtures::user(&db, "bob");
        let light = fixtures::light(&db, &ada);
        db.claim_reminder_log(&claim_for(&bob, &light, 1)).unwrap();

        db.delete_light(&light.id).unwrap();
        assert_eq!(db.list_reminder_logs(10, 0, None, Some(&bob)).unwrap().len(), 1);
        assert!(db.list_reminder_logs(10, 0, None, Some(&ada)).unwrap().is_empty());
    }

    #[test]
    fn test_candidates_use_default_preferences() {
        let db = Database::open_in_memory().unwrap();
        let ada = fixtures::user(&db, "ada");
        let bob = fixtures::user(&db, "bob");
        let cy = fixtures::user(&db, "cy");
        let dee = fixtures::user(&db, "dee");
        let light = fixtures::light(&db, &ada);
        db.insert_invitations(&light.id, &[bob.clone(), cy.clone(), dee.clone()]).unwrap();
        for user in [&bob, &cy] {
            let inv = db.get_invitation_for(&light.id, user).unwrap().unwrap();
            db.set_invitation_status(&inv.id, InvitationStatus::Accepted, None).unwrap();
        }
        let prefs = NotificationPreferences {
            light_reminder_advance_hours: 24,
            ..Default::default()
        };
        db.upsert_preferences(&cy, &prefs).unwrap();

        let mut candidates = db.reminder_candidates(&light.id).unwrap();
        candidates.sort_by_key(|(_, p)| p.light_reminder_advance_hours);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], (bob, NotificationPreferences::default()));
        assert_eq!(candidates[1], (cy, prefs));
    }
}
