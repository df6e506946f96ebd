use tracing::{debug, info};

use tessel_types::events::ServerEvent;
use tessel_types::models::{ChannelId, Identity, ProjectId, UserId};

use crate::ChatContext;
use crate::authorizer::{Intent, authorize};
use crate::presence::ConnId;
use crate::room_id::RoomId;

/// Parse a client room string and check `intent` against it.
/// Returns the canonical room key when allowed.
pub async fn resolve(ctx: &ChatContext, identity: &Identity, room: &str, intent: Intent) -> Option<(RoomId, String)> {
    let parsed = RoomId::parse(room);
    let key = parsed.canonical()?;
    if !authorize(&ctx.store, identity, &parsed, intent).await.is_allowed() {
        return None;
    }
    Some((parsed, key))
}

/// `joinRoom`. No acknowledgment; a denied join is simply not subscribed.
pub async fn join(ctx: &ChatContext, conn_id: ConnId, identity: &Identity, room: &str) {
    match resolve(ctx, identity, room, Intent::Join).await {
        Some((_, key)) => {
            info!("{} ({}) joined {}", identity.username, identity.id, key);
            ctx.dispatcher.join_room(conn_id, identity, &key).await;
        }
        None => debug!("{} ({}) join of {:?} dropped", identity.username, identity.id, room),
    }
}

/// `leaveRoom`. Needs no authorization: a connection can only leave rooms it is in.
pub async fn leave(ctx: &ChatContext, conn_id: ConnId, room: &str) {
    if let Some(key) = RoomId::parse(room).canonical() {
        ctx.dispatcher.leave_room(conn_id, &key).await;
    }
}

/// `typing` / `stopTyping`. Relayed to the rest of the room, never persisted.
pub async fn typing(ctx: &ChatContext, conn_id: ConnId, identity: &Identity, room: &str, active: bool) {
    let Some((_, key)) = resolve(ctx, identity, room, Intent::Post).await else {
        return;
    };
    let event = if active {
        ServerEvent::UserTyping {
            room: key.clone(),
            user_id: identity.id,
            username: identity.username.clone(),
        }
    } else {
        ServerEvent::StopTyping {
            room: key.clone(),
            user_id: identity.id,
        }
    };
    ctx.dispatcher.emit_to_room(&key, event, Some(conn_id)).await;
}

/// Drop a user's live subscription to `channel-{channel_id}` once their
/// membership is gone, so they stop receiving its broadcasts immediately.
pub async fn revoke_channel(ctx: &ChatContext, channel_id: ChannelId, user_id: UserId) -> usize {
    let key = RoomId::Channel(channel_id).to_string();
    ctx.dispatcher.revoke(user_id, |room| room == key).await
}

/// Same as `revoke_channel` for every bug and execution room of a project.
pub async fn revoke_project(ctx: &ChatContext, project_id: ProjectId, user_id: UserId) -> usize {
    ctx.dispatcher
        .revoke(user_id, |room| {
            matches!(RoomId::parse(room), RoomId::ResourceScoped { project_id: p, .. } if p == project_id)
        })
        .await
}
