use anyhow::Result;
use rusqlite::Connection;

use greenlight_types::models::NotificationPreferences;

use super::OptionalExt;
use crate::Database;

impl Database {
    pub fn get_preferences(&self, user_id: &str) -> Result<Option<NotificationPreferences>> {
        self.with_conn(|conn| query_preferences(conn, user_id))
    }

    /// Stored preferences, or the defaults when the user has none yet.
    pub fn effective_preferences(&self, user_id: &str) -> Result<NotificationPreferences> {
        Ok(self.get_preferences(user_id)?.unwrap_or_default())
    }

    /// Writes default preferences unless a row already exists.
    pub fn ensure_preferences(&self, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO notification_preferences (user_id) VALUES (?1)",
                [user_id],
            )?;
            Ok(())
        })
    }

    pub fn upsert_preferences(&self, user_id: &str, p: &NotificationPreferences) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notification_preferences (
                     user_id, light_invitation, light_message_owner, light_message_attending,
                     light_attending, light_reminder, light_reminder_advance_hours,
                     light_cancelled, system)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(user_id) DO UPDATE SET
                     light_invitation = excluded.light_invitation,
                     light_message_owner = excluded.light_message_owner,
                     light_message_attending = excluded.light_message_attending,
                     light_attending = excluded.light_attending,
                     light_reminder = excluded.light_reminder,
                     light_reminder_advance_hours = excluded.light_reminder_advance_hours,
                     light_cancelled = excluded.light_cancelled,
                     system = excluded.system,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
                rusqlite::params![
                    user_id,
                    p.light_invitation,
                    p.light_message_owner,
                    p.light_message_attending,
                    p.light_attending,
                    p.light_reminder,
                    p.light_reminder_advance_hours,
                    p.light_cancelled,
                    p.system,
                ],
            )?;
            Ok(())
        })
    }
}

pub(crate) fn query_preferences(conn: &Connection, user_id: &str) -> Result<Option<NotificationPreferences>> {
    conn.query_row(
        "SELECT light_invitation, light_message_owner, light_message_attending, light_attending,
                light_reminder, light_reminder_advance_hours, light_cancelled, system
         FROM notification_preferences WHERE user_id = ?1",
        [user_id],
        |row| map_preferences(row, 0),
    )
    .optional()
}

/// Maps the eight preference columns starting at `at`.
pub(crate) fn map_preferences(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<NotificationPreferences> {
    Ok(NotificationPreferences {
        light_invitation: row.get(at)?,
        light_message_owner: row.get(at + 1)?,
        light_message_attending: row.get(at + 2)?,
        light_attending: row.get(at + 3)?,
        light_reminder: row.get(at + 4)?,
        light_reminder_advance_hours: row.get(at + 5)?,
        light_cancelled: row.get(at + 6)?,
        system: row.get(at + 7)?,
    })
}
