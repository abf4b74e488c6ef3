mod friends;
mod invitations;
mod lights;
mod messages;
mod notifications;
mod preferences;
mod reminders;
mod users;

pub use invitations::StatusChange;
pub use lights::InvitedLightRow;
pub use notifications::NewNotification;
pub use reminders::ReminderClaim;

use anyhow::Result;
use rusqlite::Row;

use crate::models::{LightRow, UserSummaryRow};

pub(crate) const LIGHT_COLS: &str = "l.id, l.author_id, l.title, l.description, l.location, \
     l.start_time, l.end_time, l.max_limit, l.image_url, l.published, l.created_at, l.updated_at";

/// Maps the twelve `LIGHT_COLS` columns starting at `at`.
pub(crate) fn map_light(row: &Row<'_>, at: usize) -> rusqlite::Result<LightRow> {
    Ok(LightRow {
        id: row.get(at)?,
        author_id: row.get(at + 1)?,
        title: row.get(at + 2)?,
        description: row.get(at + 3)?,
        location: row.get(at + 4)?,
        start_time: row.get(at + 5)?,
        end_time: row.get(at + 6)?,
        max_limit: row.get(at + 7)?,
        image_url: row.get(at + 8)?,
        published: row.get(at + 9)?,
        created_at: row.get(at + 10)?,
        updated_at: row.get(at + 11)?,
    })
}

/// Maps `u.id, u.username, u.display_name, u.avatar_url` starting at `at`.
pub(crate) fn map_user_summary(row: &Row<'_>, at: usize) -> rusqlite::Result<UserSummaryRow> {
    Ok(UserSummaryRow {
        id: row.get(at)?,
        username: row.get(at + 1)?,
        display_name: row.get(at + 2)?,
        avatar_url: row.get(at + 3)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
