use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info, warn};

use tessel_types::events::{RoomMessage, ServerEvent};
use tessel_types::models::{
    ADMIN_ROLE, ChannelId, ChatMessage, Identity, MAX_BODY_CHARS, MessageType, UserId,
};

use crate::ChatContext;
use crate::authorizer::{Intent, authorize};
use crate::error::{ChatError, INVALID_BODY, INVALID_ROOM, UNKNOWN_RECIPIENT};
use crate::moderation;
use crate::presence::ConnId;
use crate::room_id::RoomId;

/// `@name` where name is word characters, dots and dashes. Names containing
/// spaces cannot be mentioned.
static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([\w.\-]+)").expect("mention pattern"));

pub const MENTION_NOTIFICATION: &str = "MENTION";

/// Trim and bound a message body. Empty or longer than `MAX_BODY_CHARS`
/// code points is rejected.
pub fn validate_body(body: &str) -> Result<String, ChatError> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_BODY_CHARS {
        return Err(ChatError::InvalidInput(INVALID_BODY));
    }
    Ok(trimmed.to_string())
}

/// Distinct mention tokens in order of first appearance.
pub fn extract_mentions(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    MENTION
        .captures_iter(body)
        .map(|caps| caps[1].to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// `message` event: route by room kind. Channel rooms go through the full
/// pipeline; other rooms are relayed without persistence.
pub async fn post_to_room(
    ctx: &ChatContext,
    conn_id: ConnId,
    identity: &Identity,
    room: &str,
    body: &str,
    message_type: MessageType,
    metadata: Option<serde_json::Value>,
) -> Result<RoomMessage, ChatError> {
    let parsed = RoomId::parse(room);
    let key = parsed.canonical().ok_or(ChatError::InvalidInput(INVALID_ROOM))?;

    if let RoomId::Channel(channel_id) = parsed {
        let message =
            post_channel_message(ctx, conn_id, identity, channel_id, body, message_type, metadata)
                .await?;
        return Ok(RoomMessage::from_chat(&key, &message));
    }

    if !authorize(&ctx.store, identity, &parsed, Intent::Post).await.is_allowed() {
        return Err(ChatError::Unauthorized);
    }
    relay_room_message(ctx, conn_id, identity, &parsed, &key, body, message_type, metadata).await
}

/// Persist and fan out a channel message.
///
/// Order: membership, body, moderation, persist, broadcast, mentions. Nothing
/// is written or broadcast unless every check before it passed. A moderation
/// rejection is reported to `conn_id` alone as `chat_error`.
pub async fn post_channel_message(
    ctx: &ChatContext,
    conn_id: ConnId,
    identity: &Identity,
    channel_id: ChannelId,
    body: &str,
    message_type: MessageType,
    metadata: Option<serde_json::Value>,
) -> Result<ChatMessage, ChatError> {
    let room = RoomId::Channel(channel_id);
    if !authorize(&ctx.store, identity, &room, Intent::Post).await.is_allowed() {
        return Err(ChatError::Unauthorized);
    }

    let body = validate_body(body)?;

    if let Err(e) = moderation::check_channel_write(&ctx.store, identity, channel_id).await {
        if let Some(code) = e.reject_code() {
            info!(
                "{} ({}) blocked in channel {}: {}",
                identity.username, identity.id, channel_id, code.as_str()
            );
            ctx.dispatcher
                .send_to_connection(
                    conn_id,
                    ServerEvent::ChatError {
                        error: code,
                        channel_id: Some(channel_id),
                        room: None,
                    },
                )
                .await;
        }
        return Err(e);
    }

    let sender_id = identity.id;
    let message = ctx
        .store
        .call(move |db| db.insert_message(channel_id, sender_id, &body, message_type, metadata.as_ref()))
        .await?;

    let key = room.to_string();
    ctx.dispatcher
        .emit_to_room(&key, ServerEvent::Message(RoomMessage::from_chat(&key, &message)), None)
        .await;

    let notified = notify_mentions(ctx, identity, &message).await;
    if notified > 0 {
        debug!("message {} notified {} mentioned user(s)", message.id, notified);
    }

    Ok(message)
}

/// Create a Mention and a Notification for every user named in the message and
/// alert their inbox. Each mention is independent: a failure is logged and
/// the rest carry on. Returns how many users were notified.
pub async fn notify_mentions(ctx: &ChatContext, sender: &Identity, message: &ChatMessage) -> usize {
    let mut notified: HashSet<UserId> = HashSet::new();

    for name in extract_mentions(&message.body) {
        let lookup = name.clone();
        let user_id = match ctx.store.call(move |db| db.find_user_id_by_username(&lookup)).await {
            Ok(Some(id)) => id,
            Ok(None) => continue,
            Err(e) => {
                warn!("Mention lookup for @{} failed: {}", name, e);
                continue;
            }
        };
        if !notified.insert(user_id) {
            continue;
        }

        let message_id = message.id;
        if let Err(e) = ctx
            .store
            .call(move |db| db.insert_mention(message_id, user_id))
            .await
        {
            warn!("Failed to record mention of {} in message {}: {}", user_id, message_id, e);
            notified.remove(&user_id);
            continue;
        }

        let text = format!("{} mentioned you", sender.username);
        let metadata = json!({ "channelId": message.channel_id, "messageId": message.id });
        let (from, stored_text, stored_meta) = (sender.id, text.clone(), metadata.clone());
        let (id, created_at) = match ctx
            .store
            .call(move |db| {
                db.insert_notification(user_id, from, MENTION_NOTIFICATION, &stored_text, Some(&stored_meta))
            })
            .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!("Failed to record mention notification for {}: {}", user_id, e);
                notified.remove(&user_id);
                continue;
            }
        };

        ctx.dispatcher
            .send_to_user(
                user_id,
                ServerEvent::NotificationNew {
                    id: Some(id),
                    notification_type: MENTION_NOTIFICATION.to_string(),
                    message: text,
                    from_user_id: sender.id,
                    metadata: Some(metadata),
                    created_at,
                },
            )
            .await;
    }

    notified.len()
}

/// Relay to a role, inbox or resource room. Nothing is stored, but a muted
/// sender is still refused with a `chat_error` naming the room. An
/// ANNOUNCEMENT to a role room is also sent as `announcement` there and to
/// the admin role room.
async fn relay_room_message(
    ctx: &ChatContext,
    conn_id: ConnId,
    identity: &Identity,
    room: &RoomId,
    key: &str,
    body: &str,
    message_type: MessageType,
    metadata: Option<serde_json::Value>,
) -> Result<RoomMessage, ChatError> {
    let body = validate_body(body)?;

    if let Err(e) = moderation::check_mute(&ctx.store, identity.id).await {
        if let Some(code) = e.reject_code() {
            info!("{} ({}) blocked in {}: {}", identity.username, identity.id, key, code.as_str());
            ctx.dispatcher
                .send_to_connection(
                    conn_id,
                    ServerEvent::ChatError {
                        error: code,
                        channel_id: None,
                        room: Some(key.to_string()),
                    },
                )
                .await;
        }
        return Err(e);
    }

    let message = RoomMessage {
        room: key.to_string(),
        id: None,
        channel_id: None,
        sender_id: identity.id,
        sender_name: identity.username.clone(),
        sender_role: identity.role.clone(),
        body,
        message_type,
        metadata,
        created_at: Utc::now(),
    };

    ctx.dispatcher
        .emit_to_room(key, ServerEvent::Message(message.clone()), None)
        .await;

    if let (RoomId::Role(role), MessageType::Announcement) = (room, message_type) {
        ctx.dispatcher
            .emit_to_room(key, ServerEvent::Announcement(message.clone()), None)
            .await;
        if role != ADMIN_ROLE {
            let admin_room = RoomId::role(ADMIN_ROLE).to_string();
            ctx.dispatcher
                .emit_to_room(&admin_room, ServerEvent::Announcement(message.clone()), None)
                .await;
        }
    }

    Ok(message)
}

/// `notification` event: persist (best-effort) and push to the target's inbox.
/// Unknown targets are dropped silently.
pub async fn send_notification(
    ctx: &ChatContext,
    identity: &Identity,
    target_user_id: UserId,
    notification_type: &str,
    message: &str,
    metadata: Option<serde_json::Value>,
) -> Result<(), ChatError> {
    let message = validate_body(message)?;
    if !ctx.store.call(move |db| db.user_exists(target_user_id)).await? {
        return Err(ChatError::InvalidInput(UNKNOWN_RECIPIENT));
    }

    let (from, kind, text, meta) = (
        identity.id,
        notification_type.to_string(),
        message.clone(),
        metadata.clone(),
    );
    let (id, created_at) = match ctx
        .store
        .call(move |db| db.insert_notification(target_user_id, from, &kind, &text, meta.as_ref()))
        .await
    {
        Ok((id, at)) => (Some(id), at),
        Err(e) => {
            warn!("Failed to store notification for {}: {}", target_user_id, e);
            (None, Utc::now())
        }
    };

    ctx.dispatcher
        .send_to_user(
            target_user_id,
            ServerEvent::NotificationNew {
                id,
                notification_type: notification_type.to_string(),
                message,
                from_user_id: identity.id,
                metadata,
                created_at,
            },
        )
        .await;
    Ok(())
}
