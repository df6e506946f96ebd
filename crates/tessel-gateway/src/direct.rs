use chrono::Utc;
use tracing::{debug, info, warn};

use tessel_types::events::ServerEvent;
use tessel_types::models::{DirectMessage, Identity, UserId};

use crate::ChatContext;
use crate::error::{ChatError, SELF_DM, UNKNOWN_RECIPIENT};
use crate::moderation;
use crate::pipeline::validate_body;

/// Send a direct message.
///
/// Only the mute check applies here; channel lock/disable has no meaning for
/// DMs. On success the message goes to the recipient's inbox and is echoed to
/// every connection of the sender.
pub async fn send_direct(
    ctx: &ChatContext,
    sender: &Identity,
    recipient_id: UserId,
    body: &str,
    reply_to_id: Option<i64>,
) -> Result<DirectMessage, ChatError> {
    if recipient_id == sender.id {
        return Err(ChatError::InvalidInput(SELF_DM));
    }
    let body = validate_body(body)?;
    moderation::check_mute(&ctx.store, sender.id).await?;

    if !ctx.store.call(move |db| db.user_exists(recipient_id)).await? {
        return Err(ChatError::InvalidInput(UNKNOWN_RECIPIENT));
    }

    let sender_id = sender.id;
    let message = ctx
        .store
        .call(move |db| db.insert_direct_message(sender_id, recipient_id, &body, reply_to_id))
        .await?;

    if let Some(original) = reply_to_id {
        let message_id = message.id;
        if let Err(e) = ctx
            .store
            .call(move |db| db.insert_dm_reply(message_id, original))
            .await
        {
            warn!("Failed to link DM {} as reply to {}: {}", message_id, original, e);
        }
    }

    ctx.dispatcher
        .send_to_user(recipient_id, ServerEvent::DmMessage(message.clone()))
        .await;
    ctx.dispatcher
        .send_to_user(sender.id, ServerEvent::DmMessage(message.clone()))
        .await;

    debug!("DM {} from {} to {}", message.id, sender.id, recipient_id);
    Ok(message)
}

/// Mark everything `other_user_id` sent to `reader` as read and send a read
/// receipt to `other_user_id`. Safe to repeat: a second call updates nothing.
pub async fn mark_read(ctx: &ChatContext, reader: &Identity, other_user_id: UserId) -> Result<usize, ChatError> {
    let (reader_id, now) = (reader.id, Utc::now());
    let updated = ctx
        .store
        .call(move |db| db.mark_direct_messages_read(reader_id, other_user_id, now))
        .await?;

    if updated > 0 {
        info!("{} ({}) read {} DM(s) from {}", reader.username, reader.id, updated, other_user_id);
    }
    ctx.dispatcher
        .send_to_user(
            other_user_id,
            ServerEvent::DmRead {
                reader_id,
                updated,
                read_at: now,
            },
        )
        .await;

    Ok(updated)
}

/// `dm_typing` / `dm_stop_typing`: fire-and-forget, recipient inbox only.
pub async fn typing(ctx: &ChatContext, sender: &Identity, recipient_id: UserId, user_name: Option<String>, active: bool) {
    if recipient_id == sender.id {
        return;
    }
    let event = if active {
        ServerEvent::DmTyping {
            sender_id: sender.id,
            user_name,
        }
    } else {
        ServerEvent::DmStopTyping { sender_id: sender.id }
    };
    ctx.dispatcher.send_to_user(recipient_id, event).await;
}
