use std::collections::HashSet;

use anyhow::Result;
use rusqlite::Connection;
use uuid::Uuid;

use greenlight_types::api::InvitationCounts;
use greenlight_types::models::InvitationStatus;

use super::{OptionalExt, map_user_summary};
use crate::Database;
use crate::models::{InvitationRow, UserSummaryRow};

const INVITATION_COLS: &str = "i.id, i.light_id, i.user_id, i.status, i.created_at, i.updated_at";

/// Outcome of a status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Changed { previous: InvitationStatus },
    Unchanged,
    /// Accepting would exceed the light's capacity.
    Full,
    Missing,
}

impl Database {
    /// Inserts `pending` invitations for `user_ids` on `light_id`, skipping
    /// duplicates in the input and users already invited. Returns the user ids
    /// that actually received a new invitation, in input order.
    pub fn insert_invitations(&self, light_id: &str, user_ids: &[String]) -> Result<Vec<String>> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO light_invitations (id, light_id, user_id, status)
                 VALUES (?1, ?2, ?3, 'pending')",
            )?;
            let mut seen = HashSet::new();
            let mut inserted = Vec::new();
            for user_id in user_ids {
                if !seen.insert(user_id.as_str()) {
                    continue;
                }
                let id = Uuid::new_v4().to_string();
                if stmt.execute(rusqlite::params![id, light_id, user_id])? == 1 {
                    inserted.push(user_id.clone());
                }
            }
            Ok(inserted)
        })
    }

    pub fn invited_user_ids(&self, light_id: &str) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT user_id FROM light_invitations WHERE light_id = ?1")?;
            let ids = stmt
                .query_map([light_id], |row| row.get(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Invitations on a light with the invitee, newest first.
    pub fn list_invitations(&self, light_id: &str) -> Result<Vec<(InvitationRow, UserSummaryRow)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, u.id, u.username, u.display_name, u.avatar_url
                 FROM light_invitations i
                 JOIN users u ON u.id = i.user_id
                 WHERE i.light_id = ?1
                 ORDER BY i.created_at DESC, u.username",
                INVITATION_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([light_id], |row| Ok((map_invitation(row)?, map_user_summary(row, 6)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_invitation(&self, id: &str) -> Result<Option<InvitationRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM light_invitations i WHERE i.id = ?1", INVITATION_COLS);
            conn.query_row(&sql, [id], map_invitation).optional()
        })
    }

    pub fn get_invitation_for(&self, light_id: &str, user_id: &str) -> Result<Option<InvitationRow>> {
        self.with_conn(|conn| query_invitation_for(conn, light_id, user_id))
    }

    /// Sets an invitation's status. Accepting checks `capacity` against the
    /// other accepted invitations under the same lock as the write.
    pub fn set_invitation_status(
        &self,
        id: &str,
        status: InvitationStatus,
        capacity: Option<u32>,
    ) -> Result<StatusChange> {
        self.with_tx(|tx| {
            let current: Option<(String, String)> = tx
                .query_row(
                    "SELECT light_id, status FROM light_invitations WHERE id = ?1",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((light_id, previous)) = current else {
                return Ok(StatusChange::Missing);
            };
            let previous: InvitationStatus = previous.parse().map_err(anyhow::Error::msg)?;
            if previous == status {
                return Ok(StatusChange::Unchanged);
            }

            if status == InvitationStatus::Accepted {
                if let Some(max) = capacity {
                    let accepted: u32 = tx.query_row(
                        "SELECT COUNT(*) FROM light_invitations
                         WHERE light_id = ?1 AND status = 'accepted' AND id != ?2",
                        rusqlite::params![light_id, id],
                        |row| row.get(0),
                    )?;
                    if accepted >= max {
                        return Ok(StatusChange::Full);
                    }
                }
            }

            tx.execute(
                "UPDATE light_invitations
                 SET status = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
                 WHERE id = ?1",
                [id, status.as_str()],
            )?;
            Ok(StatusChange::Changed { previous })
        })
    }

    pub fn delete_invitation(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM light_invitations WHERE id = ?1", [id])?;
            Ok(n == 1)
        })
    }

    pub fn invitation_counts(&self, light_id: &str) -> Result<InvitationCounts> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM light_invitations WHERE light_id = ?1 GROUP BY status",
            )?;
            let mut counts = InvitationCounts::default();
            let rows = stmt.query_map([light_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })?;
            for row in rows {
                let (status, n) = row?;
                match status.parse::<InvitationStatus>() {
                    Ok(InvitationStatus::Accepted) => counts.accepted = n,
                    Ok(InvitationStatus::Pending) => counts.pending = n,
                    Ok(InvitationStatus::Declined) => counts.declined = n,
                    Err(e) => tracing::warn!("Skipping invitation count: {}", e),
                }
            }
            Ok(counts)
        })
    }

    /// User ids invited to a light whose status is one of `statuses`.
    pub fn invitees_with_status(
        &self,
        light_id: &str,
        statuses: &[InvitationStatus],
    ) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, status FROM light_invitations WHERE light_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([light_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows
                .into_iter()
                .filter(|(_, s)| {
                    s.parse::<InvitationStatus>()
                        .map(|s| statuses.contains(&s))
                        .unwrap_or(false)
                })
                .map(|(id, _)| id)
                .collect())
        })
    }
}

fn query_invitation_for(
    conn: &Connection,
    light_id: &str,
    user_id: &str,
) -> Result<Option<InvitationRow>> {
    let sql = format!(
        "SELECT {} FROM light_invitations i WHERE i.light_id = ?1 AND i.user_id = ?2",
        INVITATION_COLS
    );
    conn.query_row(&sql, [light_id, user_id], map_invitation).optional()
}

fn map_invitation(row: &rusqlite::Row<'_>) -> rusqlite::Result<InvitationRow> {
    Ok(InvitationRow {
        id: row.get(0)?,
        light_id: row.get(1)?,
        user_id: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
