use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChannelId, ChatErrorCode, ChatMessage, DirectMessage, MessageType, UserId};

/// A message as delivered to a room.
///
/// Channel messages are persisted and carry `id`/`channelId`; messages posted
/// to role, inbox or resource rooms are relayed only and leave both empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub room: String,
    pub id: Option<i64>,
    pub channel_id: Option<ChannelId>,
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_role: String,
    pub body: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl RoomMessage {
    pub fn from_chat(room: &str, msg: &ChatMessage) -> Self {
        Self {
            room: room.to_string(),
            id: Some(msg.id),
            channel_id: Some(msg.channel_id),
            sender_id: msg.sender_id,
            sender_name: msg.sender_name.clone(),
            sender_role: msg.sender_role.clone(),
            body: msg.body.clone(),
            message_type: msg.message_type,
            metadata: msg.metadata.clone(),
            created_at: msg.created_at,
        }
    }
}

/// Events sent FROM server TO client over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Connection authenticated
    #[serde(rename = "ready")]
    Ready {
        user_id: UserId,
        username: String,
        role: String,
    },

    #[serde(rename = "message")]
    Message(RoomMessage),

    /// Role broadcast of an ANNOUNCEMENT message
    #[serde(rename = "announcement")]
    Announcement(RoomMessage),

    /// Moderation rejection, sent to the sender only. Channel rejections
    /// carry `channelId`; rejections in relay-only rooms carry `room`.
    #[serde(rename = "chat_error")]
    ChatError {
        error: ChatErrorCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_id: Option<ChannelId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
    },

    #[serde(rename = "notification:new")]
    NotificationNew {
        id: Option<i64>,
        #[serde(rename = "type")]
        notification_type: String,
        message: String,
        from_user_id: UserId,
        metadata: Option<serde_json::Value>,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "userTyping")]
    UserTyping {
        room: String,
        user_id: UserId,
        username: String,
    },

    #[serde(rename = "stopTyping")]
    StopTyping { room: String, user_id: UserId },

    #[serde(rename = "userJoined")]
    UserJoined {
        room: String,
        user_id: UserId,
        username: String,
        users: Vec<UserId>,
    },

    #[serde(rename = "userLeft")]
    UserLeft {
        room: String,
        user_id: UserId,
        users: Vec<UserId>,
    },

    #[serde(rename = "user_online")]
    UserOnline {
        user_id: UserId,
        online_users: Vec<UserId>,
    },

    #[serde(rename = "user_offline")]
    UserOffline {
        user_id: UserId,
        online_users: Vec<UserId>,
    },

    #[serde(rename = "dm_message")]
    DmMessage(DirectMessage),

    /// Read receipt: `reader_id` has read everything the receiver sent them
    #[serde(rename = "dm_read")]
    DmRead {
        reader_id: UserId,
        updated: usize,
        read_at: DateTime<Utc>,
    },

    #[serde(rename = "dm_typing")]
    DmTyping {
        sender_id: UserId,
        user_name: Option<String>,
    },

    #[serde(rename = "dm_stop_typing")]
    DmStopTyping { sender_id: UserId },
}

impl ServerEvent {
    /// Wire name, used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Message(_) => "message",
            Self::Announcement(_) => "announcement",
            Self::ChatError { .. } => "chat_error",
            Self::NotificationNew { .. } => "notification:new",
            Self::UserTyping { .. } => "userTyping",
            Self::StopTyping { .. } => "stopTyping",
            Self::UserJoined { .. } => "userJoined",
            Self::UserLeft { .. } => "userLeft",
            Self::UserOnline { .. } => "user_online",
            Self::UserOffline { .. } => "user_offline",
            Self::DmMessage(_) => "dm_message",
            Self::DmRead { .. } => "dm_read",
            Self::DmTyping { .. } => "dm_typing",
            Self::DmStopTyping { .. } => "dm_stop_typing",
        }
    }
}

/// Commands sent FROM client TO server over the WebSocket.
///
/// Room strings are kept opaque here; the gateway parses them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    #[serde(rename = "joinRoom")]
    JoinRoom(String),

    #[serde(rename = "leaveRoom")]
    LeaveRoom(String),

    #[serde(rename = "message")]
    Message {
        room: String,
        body: String,
        #[serde(default, rename = "type")]
        message_type: MessageType,
        #[serde(default)]
        metadata: Option<serde_json::Value>,
    },

    #[serde(rename = "notification")]
    Notification {
        target_user_id: UserId,
        #[serde(rename = "type")]
        notification_type: String,
        message: String,
        #[serde(default)]
        metadata: Option<serde_json::Value>,
    },

    #[serde(rename = "typing")]
    Typing(String),

    #[serde(rename = "stopTyping")]
    StopTyping(String),

    #[serde(rename = "dm_message")]
    DmMessage {
        recipient_id: UserId,
        body: String,
        #[serde(default)]
        reply_to_id: Option<i64>,
    },

    #[serde(rename = "dm_read")]
    DmRead { sender_id: UserId },

    #[serde(rename = "dm_typing")]
    DmTyping {
        recipient_id: UserId,
        #[serde(default)]
        user_name: Option<String>,
    },

    #[serde(rename = "dm_stop_typing")]
    DmStopTyping {
        recipient_id: UserId,
        #[serde(default)]
        user_name: Option<String>,
    },
}
