use anyhow::Result;
use chrono::{DateTime, Utc};

use super::{LIGHT_COLS, OptionalExt, map_light, map_user_summary};
use crate::Database;
use crate::models::{InvitationRow, LightRow, UserSummaryRow};
use crate::time::fmt_ts;

/// A light seen through one of the caller's invitations.
pub struct InvitedLightRow {
    pub invitation: InvitationRow,
    pub light: LightRow,
    pub author: UserSummaryRow,
}

impl Database {
    pub fn insert_light(&self, light: &LightRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO lights (id, author_id, title, description, location, start_time,
                                     end_time, max_limit, image_url, published, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    light.id,
                    light.author_id,
                    light.title,
                    light.description,
                    light.location,
                    light.start_time,
                    light.end_time,
                    light.max_limit,
                    light.image_url,
                    light.published,
                    light.created_at,
                    light.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_light(&self, id: &str) -> Result<Option<LightRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM lights l WHERE l.id = ?1", LIGHT_COLS);
            conn.query_row(&sql, [id], |row| map_light(row, 0)).optional()
        })
    }

    /// Writes every mutable column of `light`. Author and creation time are immutable.
    pub fn update_light(&self, light: &LightRow) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE lights
                 SET title = ?2, description = ?3, location = ?4, start_time = ?5, end_time = ?6,
                     max_limit = ?7, image_url = ?8, published = ?9, updated_at = ?10
                 WHERE id = ?1",
                rusqlite::params![
                    light.id,
                    light.title,
                    light.description,
                    light.location,
                    light.start_time,
                    light.end_time,
                    light.max_limit,
                    light.image_url,
                    light.published,
                    light.updated_at,
                ],
            )?;
            Ok(n == 1)
        })
    }

    /// Deletes the light; invitations, messages and reminders cascade.
    pub fn delete_light(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM lights WHERE id = ?1", [id])?;
            Ok(n == 1)
        })
    }

    pub fn list_lights_by_author(&self, author_id: &str) -> Result<Vec<LightRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM lights l WHERE l.author_id = ?1 ORDER BY l.end_time DESC",
                LIGHT_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([author_id], |row| map_light(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every light `user_id` is invited to, with the invitation and the author.
    pub fn list_invited_lights(&self, user_id: &str) -> Result<Vec<InvitedLightRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT i.id, i.light_id, i.user_id, i.status, i.created_at, i.updated_at,
                        {},
                        u.id, u.username, u.display_name, u.avatar_url
                 FROM light_invitations i
                 JOIN lights l ON l.id = i.light_id
                 JOIN users u ON u.id = l.author_id
                 WHERE i.user_id = ?1
                 ORDER BY i.created_at DESC",
                LIGHT_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(InvitedLightRow {
                        invitation: InvitationRow {
                            id: row.get(0)?,
                            light_id: row.get(1)?,
                            user_id: row.get(2)?,
                            status: row.get(3)?,
                            created_at: row.get(4)?,
                            updated_at: row.get(5)?,
                        },
                        light: map_light(row, 6)?,
                        author: map_user_summary(row, 18)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Author or any invitee may see a light.
    pub fn can_view_light(&self, light_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let visible = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM lights WHERE id = ?1 AND author_id = ?2)
                     OR EXISTS(SELECT 1 FROM light_invitations WHERE light_id = ?1 AND user_id = ?2)",
                [light_id, user_id],
                |row| row.get(0),
            )?;
            Ok(visible)
        })
    }

    /// Published lights whose start falls in `[from, to)`, soonest first.
    pub fn list_lights_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LightRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM lights l
                 WHERE l.published = 1 AND l.start_time >= ?1 AND l.start_time < ?2
                 ORDER BY l.start_time ASC",
                LIGHT_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([fmt_ts(from), fmt_ts(to)], |row| map_light(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
