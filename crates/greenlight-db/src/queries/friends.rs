use anyhow::Result;
use uuid::Uuid;

use super::{OptionalExt, map_user_summary};
use crate::Database;
use crate::models::{ListRow, UserSummaryRow};

impl Database {
    // -- Friends --

    pub fn list_friends(&self, user_id: &str) -> Result<Vec<UserSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.display_name, u.avatar_url
                 FROM friends f
                 JOIN users u ON u.id = f.friend_id
                 WHERE f.user_id = ?1
                 ORDER BY u.username",
            )?;
            let rows = stmt
                .query_map([user_id], |row| map_user_summary(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Adds a directed friend edge. Returns false if it already existed.
    pub fn add_friend(&self, id: &str, user_id: &str, friend_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO friends (id, user_id, friend_id) VALUES (?1, ?2, ?3)",
                [id, user_id, friend_id],
            )?;
            Ok(n == 1)
        })
    }

    pub fn remove_friend(&self, user_id: &str, friend_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM friends WHERE user_id = ?1 AND friend_id = ?2",
                [user_id, friend_id],
            )?;
            Ok(n == 1)
        })
    }

    // -- Lists --

    /// Creates a list and its initial members atomically.
    pub fn create_list(&self, id: &str, user_id: &str, name: &str, member_ids: &[String]) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO lists (id, user_id, name) VALUES (?1, ?2, ?3)",
                [id, user_id, name],
            )?;
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO list_members (id, list_id, user_id) VALUES (?1, ?2, ?3)",
            )?;
            for member in member_ids {
                stmt.execute(rusqlite::params![Uuid::new_v4().to_string(), id, member])?;
            }
            Ok(())
        })
    }

    /// Lists owned by `user_id` with their member counts.
    pub fn list_lists(&self, user_id: &str) -> Result<Vec<(ListRow, u32)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT l.id, l.user_id, l.name, l.created_at,
                        (SELECT COUNT(*) FROM list_members m WHERE m.list_id = l.id)
                 FROM lists l
                 WHERE l.user_id = ?1
                 ORDER BY l.name",
            )?;
            let rows = stmt
                .query_map([user_id], |row| Ok((map_list(row)?, row.get(4)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_list(&self, id: &str) -> Result<Option<ListRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, name, created_at FROM lists WHERE id = ?1",
                [id],
                map_list,
            )
            .optional()
        })
    }

    pub fn list_members(&self, list_id: &str) -> Result<Vec<UserSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.display_name, u.avatar_url
                 FROM list_members m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.list_id = ?1
                 ORDER BY u.username",
            )?;
            let rows = stmt
                .query_map([list_id], |row| map_user_summary(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn rename_list(&self, id: &str, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("UPDATE lists SET name = ?2 WHERE id = ?1", [id, name])?;
            Ok(n == 1)
        })
    }

    pub fn delete_list(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM lists WHERE id = ?1", [id])?;
            Ok(n == 1)
        })
    }

    pub fn add_list_member(&self, list_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO list_members (id, list_id, user_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![Uuid::new_v4().to_string(), list_id, user_id],
            )?;
            Ok(n == 1)
        })
    }

    pub fn remove_list_member(&self, list_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM list_members WHERE list_id = ?1 AND user_id = ?2",
                [list_id, user_id],
            )?;
            Ok(n == 1)
        })
    }

    /// Distinct members of the given lists, restricted to lists `owner_id` owns.
    pub fn members_of_owned_lists(&self, owner_id: &str, list_ids: &[String]) -> Result<Vec<String>> {
        if list_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (2..=list_ids.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT m.user_id
                 FROM list_members m
                 JOIN lists l ON l.id = m.list_id
                 WHERE l.user_id = ?1 AND m.list_id IN ({})
                 GROUP BY m.user_id
                 ORDER BY MIN(m.created_at)",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(list_ids.len() + 1);
            params.push(&owner_id);
            params.extend(list_ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));

            let rows = stmt
                .query_map(params.as_slice(), |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_list(row: &rusqlite::Row<'_>) -> rusqlite::Result<ListRow> {
    Ok(ListRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::queries::fixtures;

    #[test]
    fn test_friend_edge_is_unique() {
        let db = Database::open_in_memory().unwrap();
        let ada = fixtures::user(&db, "ada");
        let bob = fixtures::user(&db, "bob");

        assert!(db.add_friend("f1", &ada, &bob).unwrap());
        assert!(!db.add_friend("f2", &ada, &bob).unwrap());
        assert_eq!(db.list_friends(&ada).unwrap().len(), 1);
        // Directed: bob has not friended ada.
        assert!(db.list_friends(&bob).unwrap().is_empty());

        assert!(db.remove_friend(&ada, &bob).unwrap());
        assert!(!db.remove_friend(&ada, &bob).unwrap());
    }

    #[test]
    fn test_list_member_counts() {
        let db = Database::open_in_memory().unwrap();
        let ada = fixtures::user(&db, "ada");
        let bob = fixtures::user(&db, "bob");
        let cy = fixtures::user(&db, "cy");

        db.create_list("l1", &ada, "Climbing", &[bob.clone(), cy.clone(), bob.clone()]).unwrap();
        db.create_list("l2", &ada, "Book club", &[]).unwrap();

        let lists = db.list_lists(&ada).unwrap();
        let counts: Vec<_> = lists.iter().map(|(l, n)| (l.name.as_str(), *n)).collect();
        assert_eq!(counts, vec![("Book club", 0), ("Climbing", 2)]);

        assert!(db.remove_list_member("l1", &cy).unwrap());
        assert!(db.add_list_member("l2", &cy).unwrap());
        assert!(!db.add_list_member("l2", &cy).unwrap());
        assert_eq!(db.list_members("l1").unwrap().len(), 1);
    }

    #[test]
    fn test_members_only_from_owned_lists() {
        let db = Database::open_in_memory().unwrap();
        let ada = fixtures::user(&db, "ada");
        let bob = fixtures::user(&db, "bob");
        let cy = fixtures::user(&db, "cy");
        let eve = fixtures::user(&db, "eve");

        db.create_list("mine", &ada, "Mine", &[bob.clone(), cy.clone()]).unwrap();
        db.create_list("also-mine", &ada, "Also", &[cy.clone()]).unwrap();
        db.create_list("theirs", &eve, "Theirs", &[eve.clone()]).unwrap();

        let ids = vec!["mine".to_string(), "also-mine".to_string(), "theirs".to_string()];
        let mut members = db.members_of_owned_lists(&ada, &ids).unwrap();
        members.sort();
        let mut expected = vec![bob, cy];
        expected.sort();
        assert_eq!(members, expected);
    }
}
