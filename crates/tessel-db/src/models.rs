//! Database row types. These map directly to SQLite rows.
//! Distinct from tessel-types models to keep the DB layer independent.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use tessel_types::models::{ChannelFlags, ChatMessage, DirectMessage, MessageType, MuteState};

/// Fixed-width UTC timestamp used for every stored time column.
pub fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str, what: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}' on {}: {}", raw, what, e);
        DateTime::default()
    })
}

fn parse_metadata(raw: Option<String>, what: &str) -> Option<serde_json::Value> {
    raw.and_then(|s| match serde_json::from_str(&s) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Corrupt metadata on {}: {}", what, e);
            None
        }
    })
}

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

pub struct ChannelRow {
    pub id: i64,
    pub name: String,
    pub is_locked: bool,
    pub is_disabled: bool,
    pub created_at: String,
}

impl ChannelRow {
    pub fn flags(&self) -> ChannelFlags {
        ChannelFlags {
            is_locked: self.is_locked,
            is_disabled: self.is_disabled,
        }
    }
}

pub struct MuteRow {
    pub is_muted: bool,
    pub muted_until: Option<String>,
    pub reason: Option<String>,
}

impl MuteRow {
    pub fn into_model(self) -> MuteState {
        MuteState {
            is_muted: self.is_muted,
            muted_until: self.muted_until.as_deref().map(|s| parse_ts(s, "muted_until")),
            reason: self.reason,
        }
    }
}

pub struct MessageRow {
    pub id: i64,
    pub channel_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub sender_role: String,
    pub body: String,
    pub message_type: String,
    pub metadata: Option<String>,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_model(self) -> ChatMessage {
        let what = format!("message {}", self.id);
        ChatMessage {
            id: self.id,
            channel_id: self.channel_id,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            sender_role: self.sender_role,
            body: self.body,
            message_type: MessageType::from_db(&self.message_type),
            metadata: parse_metadata(self.metadata, &what),
            created_at: parse_ts(&self.created_at, &what),
        }
    }
}

pub struct DirectMessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub body: String,
    pub is_read: bool,
    pub reply_to_id: Option<i64>,
    pub created_at: String,
}

impl DirectMessageRow {
    pub fn into_model(self) -> DirectMessage {
        let created_at = parse_ts(&self.created_at, &format!("direct message {}", self.id));
        DirectMessage {
            id: self.id,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            body: self.body,
            created_at,
            is_read: self.is_read,
            reply_to_id: self.reply_to_id,
        }
    }
}

pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub from_user_id: Option<i64>,
    pub notification_type: String,
    pub message: String,
    pub metadata: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}
