use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Timestamps are stored as fixed-width RFC 3339 UTC strings written by the
/// application (see `models::ts`), so text comparison orders them correctly.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            username        TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            role            TEXT NOT NULL,
            is_muted        INTEGER NOT NULL DEFAULT 0,
            muted_until     TEXT,
            mute_reason     TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS channels (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL UNIQUE,
            is_locked       INTEGER NOT NULL DEFAULT 0,
            is_disabled     INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS channel_members (
            channel_id      INTEGER NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at      TEXT NOT NULL,
            PRIMARY KEY (channel_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS project_members (
            project_id      INTEGER NOT NULL,
            user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            is_active       INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (project_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id      INTEGER NOT NULL REFERENCES channels(id),
            sender_id       INTEGER NOT NULL REFERENCES users(id),
            body            TEXT NOT NULL,
            type            TEXT NOT NULL DEFAULT 'GENERAL',
            metadata        TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, created_at);

        CREATE TABLE IF NOT EXISTS mentions (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id          INTEGER NOT NULL REFERENCES messages(id),
            mentioned_user_id   INTEGER NOT NULL REFERENCES users(id),
            created_at          TEXT NOT NULL,
            UNIQUE(message_id, mentioned_user_id)
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL REFERENCES users(id),
            from_user_id    INTEGER REFERENCES users(id),
            type            TEXT NOT NULL,
            message         TEXT NOT NULL,
            metadata        TEXT,
            is_read         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);

        CREATE TABLE IF NOT EXISTS direct_messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id       INTEGER NOT NULL REFERENCES users(id),
            recipient_id    INTEGER NOT NULL REFERENCES users(id),
            body            TEXT NOT NULL,
            is_read         INTEGER NOT NULL DEFAULT 0,
            read_at         TEXT,
            reply_to_id     INTEGER,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_dm_pair
            ON direct_messages(sender_id, recipient_id, is_read);

        CREATE TABLE IF NOT EXISTS dm_replies (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id      INTEGER NOT NULL REFERENCES direct_messages(id),
            reply_to_id     INTEGER NOT NULL REFERENCES direct_messages(id),
            created_at      TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
