use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id            TEXT PRIMARY KEY,
                username      TEXT NOT NULL UNIQUE,
                password      TEXT NOT NULL,
                display_name  TEXT,
                avatar_url    TEXT,
                created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            );

            CREATE TABLE lights (
                id           TEXT PRIMARY KEY,
                author_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title        TEXT NOT NULL,
                description  TEXT,
                location     TEXT NOT NULL,
                start_time   TEXT NOT NULL,
                end_time     TEXT NOT NULL,
                max_limit    INTEGER,
                image_url    TEXT,
                published    INTEGER NOT NULL DEFAULT 1,
                created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                updated_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            );

            CREATE INDEX idx_lights_author ON lights(author_id, end_time);
            CREATE INDEX idx_lights_start ON lights(start_time);

            CREATE TABLE light_invitations (
                id          TEXT PRIMARY KEY,
                light_id    TEXT NOT NULL REFERENCES lights(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status      TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'accepted', 'declined')),
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                UNIQUE(light_id, user_id)
            );

            CREATE INDEX idx_invitations_user ON light_invitations(user_id);

            CREATE TABLE light_messages (
                id          TEXT PRIMARY KEY,
                light_id    TEXT NOT NULL REFERENCES lights(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                message     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            );

            CREATE INDEX idx_messages_light ON light_messages(light_id, created_at);

            CREATE TABLE friends (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                friend_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                UNIQUE(user_id, friend_id)
            );

            CREATE TABLE lists (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            );

            CREATE TABLE list_members (
                id          TEXT PRIMARY KEY,
                list_id     TEXT NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                UNIQUE(list_id, user_id)
            );

            CREATE TABLE notifications (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                message     TEXT NOT NULL,
                kind        TEXT NOT NULL,
                related_id  TEXT,
                read        INTEGER NOT NULL DEFAULT 0,
                data        TEXT NOT NULL DEFAULT '{}',
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, created_at);

            CREATE TABLE notification_preferences (
                user_id                       TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                light_invitation              INTEGER NOT NULL DEFAULT 1,
                light_message_owner           INTEGER NOT NULL DEFAULT 1,
                light_message_attending       INTEGER NOT NULL DEFAULT 1,
                light_attending               INTEGER NOT NULL DEFAULT 1,
                light_reminder                INTEGER NOT NULL DEFAULT 1,
                light_reminder_advance_hours  INTEGER NOT NULL DEFAULT 1
                                              CHECK (light_reminder_advance_hours IN (1, 2, 6, 12, 24)),
                light_cancelled               INTEGER NOT NULL DEFAULT 1,
                system                        INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            );

            CREATE TABLE reminders (
                id                TEXT PRIMARY KEY,
                user_id           TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                light_id          TEXT NOT NULL REFERENCES lights(id) ON DELETE CASCADE,
                light_title       TEXT NOT NULL,
                event_start_time  TEXT NOT NULL,
                reminder_time     TEXT NOT NULL,
                advance_hours     INTEGER NOT NULL,
                sent              INTEGER NOT NULL DEFAULT 0,
                created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                UNIQUE(user_id, light_id)
            );

            CREATE INDEX idx_reminders_due ON reminders(sent, reminder_time);

            -- No foreign keys: logs outlive the light.
            CREATE TABLE reminder_logs (
                id                TEXT PRIMARY KEY,
                user_id           TEXT NOT NULL,
                light_id          TEXT NOT NULL,
                notification_id   TEXT,
                reminder_type     TEXT NOT NULL,
                light_title       TEXT NOT NULL,
                advance_hours     INTEGER NOT NULL,
                event_start_time  TEXT NOT NULL,
                sent_at           TEXT NOT NULL,
                UNIQUE(user_id, light_id, advance_hours)
            );

            CREATE INDEX idx_reminder_logs_sent ON reminder_logs(sent_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
