use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type ChannelId = i64;
pub type ProjectId = i64;

/// Role allowed to bypass channel lock/disable and to manage moderation state.
pub const ADMIN_ROLE: &str = "ADMIN";

/// Role given to newly registered users (the very first user becomes ADMIN).
pub const DEFAULT_ROLE: &str = "TESTER";

/// Role names become room keys (`role:{ROLE}`): ASCII letters, digits and `_`.
pub fn is_valid_role(role: &str) -> bool {
    !role.is_empty() && role.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Maximum message body length, counted in code points after trimming.
pub const MAX_BODY_CHARS: usize = 2000;

/// Who is on the other end of a connection.
///
/// Built once when the connection authenticates and threaded through every
/// call after that. Nothing in here is ever taken from client input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: UserId,
    pub username: String,
    pub role: String,
}

impl Identity {
    pub fn new(id: UserId, username: impl Into<String>, role: &str) -> Self {
        Self {
            id,
            username: username.into(),
            role: role.to_uppercase(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    #[default]
    General,
    BugDiscussion,
    TestExecution,
    Announcement,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "GENERAL",
            Self::BugDiscussion => "BUG_DISCUSSION",
            Self::TestExecution => "TEST_EXECUTION",
            Self::Announcement => "ANNOUNCEMENT",
        }
    }

    /// Unknown values read back from the store fall back to GENERAL.
    pub fn from_db(s: &str) -> Self {
        match s {
            "BUG_DISCUSSION" => Self::BugDiscussion,
            "TEST_EXECUTION" => Self::TestExecution,
            "ANNOUNCEMENT" => Self::Announcement,
            _ => Self::General,
        }
    }
}

/// Reject codes shown to the sender of a moderated channel write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatErrorCode {
    Muted,
    ChatDisabled,
    ChannelLocked,
}

impl ChatErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Muted => "MUTED",
            Self::ChatDisabled => "CHAT_DISABLED",
            Self::ChannelLocked => "CHANNEL_LOCKED",
        }
    }
}

/// A persisted channel message with the sender's display fields attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_role: String,
    pub body: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: i64,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub reply_to_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteState {
    pub is_muted: bool,
    pub muted_until: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFlags {
    pub is_locked: bool,
    pub is_disabled: bool,
}
