use crate::Database;
use crate::models::{
    ChannelRow, DirectMessageRow, MessageRow, MuteRow, NotificationRow, UserRow, ts,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tessel_types::models::{
    ADMIN_ROLE, ChannelFlags, ChatMessage, DEFAULT_ROLE, DirectMessage, MessageType, is_valid_role,
};

/// Roles name rooms (`role:{ROLE}`), so only routable names are stored.
fn insert_user(conn: &Connection, username: &str, password_hash: &str, role: &str) -> Result<i64> {
    if !is_valid_role(role) {
        anyhow::bail!("invalid role {:?}: expected letters, digits or '_'", role);
    }
    conn.execute(
        "INSERT INTO users (username, password, role, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![username, password_hash, role.to_uppercase(), ts(Utc::now())],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, password_hash: &str, role: &str) -> Result<i64> {
        self.with_conn(|conn| insert_user(conn, username, password_hash, role))
    }

    /// Self-service signup. The name check, the first-account check and the
    /// insert run under one lock, so two concurrent signups cannot both take
    /// a name or both become admin. `None` means the username is taken.
    pub fn register_user(&self, username: &str, password_hash: &str) -> Result<Option<(i64, &'static str)>> {
        self.with_conn(|conn| {
            let taken = conn
                .query_row("SELECT 1 FROM users WHERE username = ?1", [username], |_| Ok(()))
                .optional()?
                .is_some();
            if taken {
                return Ok(None);
            }
            let existing: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            let role = if existing == 0 { ADMIN_ROLE } else { DEFAULT_ROLE };
            Ok(Some((insert_user(conn, username, password_hash, role)?, role)))
        })
    }

    pub fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", &username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id))
    }

    pub fn user_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |_| Ok(()))
                .optional()?
                .is_some())
        })
    }

    /// Exact, case-sensitive username match used to resolve `@mentions`.
    pub fn find_user_id_by_username(&self, username: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id FROM users WHERE username = ?1", [username], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    // -- Channels --

    pub fn create_channel(&self, name: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (name, created_at) VALUES (?1, ?2)",
                params![name, ts(Utc::now())],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_channel(&self, id: i64) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, is_locked, is_disabled, created_at FROM channels WHERE id = ?1",
                [id],
                |row| {
                    Ok(ChannelRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        is_locked: row.get(2)?,
                        is_disabled: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn channel_flags(&self, id: i64) -> Result<Option<ChannelFlags>> {
        Ok(self.get_channel(id)?.map(|c| c.flags()))
    }

    /// Update whichever flags are given. Returns false if the channel does not exist.
    pub fn set_channel_flags(
        &self,
        id: i64,
        is_locked: Option<bool>,
        is_disabled: Option<bool>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE channels
                 SET is_locked = COALESCE(?2, is_locked),
                     is_disabled = COALESCE(?3, is_disabled)
                 WHERE id = ?1",
                params![id, is_locked, is_disabled],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn add_channel_member(&self, channel_id: i64, user_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO channel_members (channel_id, user_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![channel_id, user_id, ts(Utc::now())],
            )?;
            Ok(())
        })
    }

    pub fn remove_channel_member(&self, channel_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                [channel_id, user_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn is_channel_member(&self, channel_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                    [channel_id, user_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }

    // -- Projects --

    pub fn add_project_member(&self, project_id: i64, user_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO project_members (project_id, user_id, is_active) VALUES (?1, ?2, 1)
                 ON CONFLICT(project_id, user_id) DO UPDATE SET is_active = 1",
                [project_id, user_id],
            )?;
            Ok(())
        })
    }

    pub fn deactivate_project_member(&self, project_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE project_members SET is_active = 0 WHERE project_id = ?1 AND user_id = ?2",
                [project_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// True only for an active assignment.
    pub fn is_project_member(&self, user_id: i64, project_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM project_members
                     WHERE project_id = ?1 AND user_id = ?2 AND is_active = 1",
                    [project_id, user_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }

    // -- Mute state --

    pub fn get_mute_state(&self, user_id: i64) -> Result<Option<MuteRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT is_muted, muted_until, mute_reason FROM users WHERE id = ?1",
                [user_id],
                |row| {
                    Ok(MuteRow {
                        is_muted: row.get(0)?,
                        muted_until: row.get(1)?,
                        reason: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn mute_user(
        &self,
        user_id: i64,
        until: Option<DateTime<Utc>>,
        reason: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_muted = 1, muted_until = ?2, mute_reason = ?3 WHERE id = ?1",
                params![user_id, until.map(ts), reason],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn unmute_user(&self, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_muted = 0, muted_until = NULL, mute_reason = NULL WHERE id = ?1",
                [user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Clear a mute whose `muted_until` is at or before `now`, as one statement.
    /// Returns true if a mute was cleared. Open-ended mutes are never touched.
    pub fn clear_expired_mute(&self, user_id: i64, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_muted = 0, muted_until = NULL, mute_reason = NULL
                 WHERE id = ?1 AND is_muted = 1
                   AND muted_until IS NOT NULL AND muted_until <= ?2",
                params![user_id, ts(now)],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Channel messages --

    pub fn insert_message(
        &self,
        channel_id: i64,
        sender_id: i64,
        body: &str,
        message_type: MessageType,
        metadata: Option<&serde_json::Value>,
    ) -> Result<ChatMessage> {
        let metadata = metadata.map(|m| m.to_string());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (channel_id, sender_id, body, type, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![channel_id, sender_id, body, message_type.as_str(), metadata, ts(Utc::now())],
            )?;
            let id = conn.last_insert_rowid();
            let row = conn.query_row(&format!("{MESSAGE_SELECT} WHERE m.id = ?1"), [id], map_message)?;
            Ok(row.into_model())
        })
    }

    /// Newest first. `before` is the `created_at` of the oldest message already seen.
    pub fn get_messages(
        &self,
        channel_id: i64,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT}
                 WHERE m.channel_id = ?1 AND (?2 IS NULL OR m.created_at < ?2)
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?3"
            ))?;
            let rows = stmt
                .query_map(params![channel_id, before, limit], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_messages(&self, channel_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE channel_id = ?1",
                [channel_id],
                |row| row.get(0),
            )?)
        })
    }

    // -- Mentions & notifications --

    pub fn insert_mention(&self, message_id: i64, mentioned_user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO mentions (message_id, mentioned_user_id, created_at) VALUES (?1, ?2, ?3)",
                params![message_id, mentioned_user_id, ts(Utc::now())],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn count_mentions(&self, message_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM mentions WHERE message_id = ?1",
                [message_id],
                |row| row.get(0),
            )?)
        })
    }

    /// Returns the new row id and its creation time.
    pub fn insert_notification(
        &self,
        user_id: i64,
        from_user_id: i64,
        notification_type: &str,
        message: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(i64, DateTime<Utc>)> {
        let metadata = metadata.map(|m| m.to_string());
        let now = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (user_id, from_user_id, type, message, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![user_id, from_user_id, notification_type, message, metadata, ts(now)],
            )?;
            Ok((conn.last_insert_rowid(), now))
        })
    }

    pub fn get_notifications(&self, user_id: i64) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, from_user_id, type, message, metadata, is_read, created_at
                 FROM notifications WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        from_user_id: row.get(2)?,
                        notification_type: row.get(3)?,
                        message: row.get(4)?,
                        metadata: row.get(5)?,
                        is_read: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Direct messages --

    pub fn insert_direct_message(
        &self,
        sender_id: i64,
        recipient_id: i64,
        body: &str,
        reply_to_id: Option<i64>,
    ) -> Result<DirectMessage> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO direct_messages (sender_id, recipient_id, body, reply_to_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![sender_id, recipient_id, body, reply_to_id, ts(Utc::now())],
            )?;
            let id = conn.last_insert_rowid();
            let row = conn.query_row(&format!("{DM_SELECT} WHERE id = ?1"), [id], map_direct_message)?;
            Ok(row.into_model())
        })
    }

    pub fn insert_dm_reply(&self, message_id: i64, reply_to_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO dm_replies (message_id, reply_to_id, created_at) VALUES (?1, ?2, ?3)",
                params![message_id, reply_to_id, ts(Utc::now())],
            )?;
            Ok(())
        })
    }

    pub fn count_dm_replies(&self, reply_to_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM dm_replies WHERE reply_to_id = ?1",
                [reply_to_id],
                |row| row.get(0),
            )?)
        })
    }

    /// Mark every unread message from `sender_id` to `reader_id` as read in a
    /// single statement. Returns how many rows changed.
    pub fn mark_direct_messages_read(
        &self,
        reader_id: i64,
        sender_id: i64,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE direct_messages SET is_read = 1, read_at = ?3
                 WHERE recipient_id = ?1 AND sender_id = ?2 AND is_read = 0",
                params![reader_id, sender_id, ts(now)],
            )?)
        })
    }

    /// Both directions of the conversation, newest first.
    pub fn get_direct_messages(&self, a: i64, b: i64, limit: u32) -> Result<Vec<DirectMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{DM_SELECT}
                 WHERE (sender_id = ?1 AND recipient_id = ?2)
                    OR (sender_id = ?2 AND recipient_id = ?1)
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3"
            ))?;
            let rows = stmt
                .query_map(params![a, b, limit], map_direct_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// JOIN users to fetch the sender's display fields in a single query
const MESSAGE_SELECT: &str =
    "SELECT m.id, m.channel_id, m.sender_id, u.username, u.role, m.body, m.type, m.metadata, m.created_at
     FROM messages m
     LEFT JOIN users u ON m.sender_id = u.id";

const DM_SELECT: &str =
    "SELECT id, sender_id, recipient_id, body, is_read, reply_to_id, created_at FROM direct_messages";

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
        sender_role: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        body: row.get(5)?,
        message_type: row.get(6)?,
        metadata: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn map_direct_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<DirectMessageRow> {
    Ok(DirectMessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        body: row.get(3)?,
        is_read: row.get(4)?,
        reply_to_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn query_user(
    conn: &Connection,
    filter: &str,
    value: &dyn rusqlite::types::ToSql,
) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, password, role, created_at FROM users WHERE {filter}"
    ))?;

    stmt.query_row([value], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            password: row.get(2)?,
            role: row.get(3)?,
            created_at: row.get(4)?,
        })
    })
    .optional()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
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
