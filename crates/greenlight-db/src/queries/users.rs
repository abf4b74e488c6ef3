use anyhow::Result;
use rusqlite::Connection;

use super::{OptionalExt, map_user_summary};
use crate::Database;
use crate::models::{UserRow, UserSummaryRow};

const USER_COLS: &str = "id, username, password, display_name, avatar_url, created_at";

impl Database {
    /// Inserts a user. Returns false if the username is already taken.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        display_name: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "INSERT INTO users (id, username, password, display_name) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(username) DO NOTHING",
                rusqlite::params![id, username, password_hash, display_name],
            )?;
            Ok(n == 1)
        })
    }

    pub fn update_password(&self, id: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET password = ?2 WHERE id = ?1",
                [id, password_hash],
            )?;
            Ok(n == 1)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Updates only the fields given; `None` keeps the stored value.
    pub fn update_profile(
        &self,
        id: &str,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users
                 SET display_name = COALESCE(?2, display_name),
                     avatar_url = COALESCE(?3, avatar_url)
                 WHERE id = ?1",
                rusqlite::params![id, display_name, avatar_url],
            )?;
            Ok(n == 1)
        })
    }

    /// Every user except `user_id`, flagged with whether `user_id` has friended them.
    pub fn list_directory(&self, user_id: &str) -> Result<Vec<(UserSummaryRow, bool)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.display_name, u.avatar_url,
                        EXISTS(SELECT 1 FROM friends f WHERE f.user_id = ?1 AND f.friend_id = u.id)
                 FROM users u
                 WHERE u.id != ?1
                 ORDER BY u.username",
            )?;
            let rows = stmt
                .query_map([user_id], |row| Ok((map_user_summary(row, 0)?, row.get(4)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the subset of `ids` that name existing users.
    pub fn existing_user_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT 1 FROM users WHERE id = ?1")?;
            let mut found = Vec::with_capacity(ids.len());
            for id in ids {
                if stmt.exists([id])? {
                    found.push(id.clone());
                }
            }
            Ok(found)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLS, column);
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                display_name: row.get(3)?,
                avatar_url: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}
