use anyhow::Result;
use rusqlite::Connection;

use greenlight_types::models::NotificationKind;

use super::OptionalExt;
use crate::Database;
use crate::models::NotificationRow;

const NOTIFICATION_COLS: &str =
    "id, user_id, title, message, kind, related_id, read, data, created_at";

/// Fields of a notification about to be written.
pub struct NewNotification<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub kind: NotificationKind,
    pub title: &'a str,
    pub message: &'a str,
    pub related_id: Option<&'a str>,
    pub data: &'a serde_json::Value,
}

impl Database {
    pub fn insert_notification(&self, n: &NewNotification<'_>) -> Result<NotificationRow> {
        let data = serde_json::to_string(n.data)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, title, message, kind, related_id, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    n.id,
                    n.user_id,
                    n.title,
                    n.message,
                    n.kind.as_str(),
                    n.related_id,
                    data
                ],
            )?;
            query_notification(conn, n.id)?
                .ok_or_else(|| anyhow::anyhow!("notification {} vanished after insert", n.id))
        })
    }

    /// A page of a user's notifications, newest first.
    pub fn list_notifications(&self, user_id: &str, limit: u32, offset: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3",
                NOTIFICATION_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit, offset], map_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// (unread, total) for a user.
    pub fn notification_count(&self, user_id: &str) -> Result<(u32, u32)> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT COALESCE(SUM(CASE WHEN read = 0 THEN 1 ELSE 0 END), 0), COUNT(*)
                 FROM notifications WHERE user_id = ?1",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(counts)
        })
    }

    pub fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            Ok(n == 1)
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
                [user_id],
            )?;
            Ok(n)
        })
    }

    pub fn delete_notification(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            Ok(n == 1)
        })
    }
}

fn query_notification(conn: &Connection, id: &str) -> Result<Option<NotificationRow>> {
    let sql = format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLS);
    conn.query_row(&sql, [id], map_notification).optional()
}

fn map_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        kind: row.get(4)?,
        related_id: row.get(5)?,
        read: row.get(6)?,
        data: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use greenlight_types::models::NotificationKind;

    use super::NewNotification;
    use crate::Database;
    use crate::queries::fixtures;

    fn notify(db: &Database, id: &str, user_id: &str) {
        let data = serde_json::json!({ "light_title": "Picnic" });
        db.insert_notification(&NewNotification {
            id,
            user_id,
            kind: NotificationKind::System,
            title: "Hello",
            message: "World",
            related_id: None,
            data: &data,
        })
        .unwrap();
    }

    #[test]
    fn test_counts_and_mark_read() {
        let db = Database::open_in_memory().unwrap();
        let ada = fixtures::user(&db, "ada");
        let bob = fixtures::user(&db, "bob");
        notify(&db, "n1", &ada);
        notify(&db, "n2", &ada);
        notify(&db, "n3", &bob);

        assert_eq!(db.notification_count(&ada).unwrap(), (2, 2));
        assert!(db.mark_notification_read("n1", &ada).unwrap());
        // Cannot touch someone else's notification.
        assert!(!db.mark_notification_read("n3", &ada).unwrap());
        assert_eq!(db.notification_count(&ada).unwrap(), (1, 2));

        assert_eq!(db.mark_all_notifications_read(&ada).unwrap(), 1);
        assert_eq!(db.notification_count(&ada).unwrap(), (0, 2));
        assert_eq!(db.notification_count(&bob).unwrap(), (1, 1));
    }

    #[test]
    fn test_paging_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let ada = fixtures::user(&db, "ada");
        for i in 0..5 {
            notify(&db, &format!("n{}", i), &ada);
        }

        let page = db.list_notifications(&ada, 2, 1).unwrap();
        let ids: Vec<_> = page.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n3", "n2"]);

        let n = page.into_iter().next().unwrap().into_notification();
        assert_eq!(n.kind, NotificationKind::System);
        assert_eq!(n.data["light_title"], "Picnic");
        assert!(!n.read);
    }

    #[test]
    fn test_delete_scoped_to_owner() {
        let db = Database::open_in_memory().unwrap();
        let ada = fixtures::user(&db, "ada");
        let bob = fixtures::user(&db, "bob");
        notify(&db, "n1", &ada);

        assert!(!db.delete_notification("n1", &bob).unwrap());
        assert!(db.delete_notification("n1", &ada).unwrap());
        assert_eq!(db.notification_count(&ada).unwrap(), (0, 0));
    }
}
