use anyhow::Result;
use rusqlite::Connection;

use super::{OptionalExt, map_user_summary};
use crate::Database;
use crate::models::{MessageRow, UserSummaryRow};

impl Database {
    pub fn insert_message(
        &self,
        id: &str,
        light_id: &str,
        user_id: &str,
        message: &str,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO light_messages (id, light_id, user_id, message) VALUES (?1, ?2, ?3, ?4)",
                [id, light_id, user_id, message],
            )?;
            query_message(conn, id)?.ok_or_else(|| anyhow::anyhow!("message {} vanished after insert", id))
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Messages on a light with their authors, newest first.
    pub fn list_messages(&self, light_id: &str) -> Result<Vec<(MessageRow, UserSummaryRow)>> {
        self.with_conn(|conn| {
            // JOIN users to fetch the author in a single query
            let mut stmt = conn.prepare(
                "SELECT m.id, m.light_id, m.user_id, m.message, m.created_at, m.updated_at,
                        u.id, u.username, u.display_name, u.avatar_url
                 FROM light_messages m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.light_id = ?1
                 ORDER BY m.created_at DESC, m.rowid DESC",
            )?;
            let rows = stmt
                .query_map([light_id], |row| Ok((map_message(row)?, map_user_summary(row, 6)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_message(&self, id: &str, message: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE light_messages
                 SET message = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
                 WHERE id = ?1",
                [id, message],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_message(conn, id)
        })
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM light_messages WHERE id = ?1", [id])?;
            Ok(n == 1)
        })
    }
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    conn.query_row(
        "SELECT id, light_id, user_id, message, created_at, updated_at FROM light_messages WHERE id = ?1",
        [id],
        map_message,
    )
    .optional()
}

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        light_id: row.get(1)?,
        user_id: row.get(2)?,
        message: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
