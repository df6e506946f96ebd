use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use tessel_types::events::{ClientCommand, ServerEvent};
use tessel_types::models::Identity;

use crate::ChatContext;
use crate::presence::ConnId;
use crate::{direct, pipeline, rooms};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a WebSocket whose credential was already verified at the HTTP
/// upgrade, so no unauthenticated socket ever reaches this point.
pub async fn handle_connection(socket: WebSocket, ctx: ChatContext, identity: Identity) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", identity.username, identity.id);

    let ready = ServerEvent::Ready {
        user_id: identity.id,
        username: identity.username.clone(),
        role: identity.role.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    // Subscribe before registering so this connection sees its own user_online
    let mut broadcast_rx = ctx.dispatcher.subscribe();
    let (conn_id, mut user_rx) = ctx.dispatcher.connect(&identity).await;

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + room/targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let Some(event) = result else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Commands from one connection are handled strictly in arrival order
    let recv_ctx = ctx.clone();
    let recv_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_ctx, conn_id, &recv_identity, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_identity.username,
                            recv_identity.id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ctx.dispatcher.disconnect(conn_id).await;
    info!("{} ({}) disconnected from gateway", identity.username, identity.id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode {} event: {}", event.name(), e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

/// Run one client command. Failures never end the connection: silent ones are
/// logged at debug, moderation rejections have already been sent to the client.
pub async fn handle_command(ctx: &ChatContext, conn_id: ConnId, identity: &Identity, cmd: ClientCommand) {
    let outcome = match cmd {
        ClientCommand::JoinRoom(room) => {
            rooms::join(ctx, conn_id, identity, &room).await;
            Ok(())
        }

        ClientCommand::LeaveRoom(room) => {
            rooms::leave(ctx, conn_id, &room).await;
            Ok(())
        }

        ClientCommand::Message {
            room,
            body,
            message_type,
            metadata,
        } => pipeline::post_to_room(ctx, conn_id, identity, &room, &body, message_type, metadata)
            .await
            .map(|_| ()),

        ClientCommand::Notification {
            target_user_id,
            notification_type,
            message,
            metadata,
        } => {
            pipeline::send_notification(ctx, identity, target_user_id, &notification_type, &message, metadata)
                .await
        }

        ClientCommand::Typing(room) => {
            rooms::typing(ctx, conn_id, identity, &room, true).await;
            Ok(())
        }

        ClientCommand::StopTyping(room) => {
            rooms::typing(ctx, conn_id, identity, &room, false).await;
            Ok(())
        }

        ClientCommand::DmMessage {
            recipient_id,
            body,
            reply_to_id,
        } => direct::send_direct(ctx, identity, recipient_id, &body, reply_to_id)
            .await
            .map(|_| ()),

        ClientCommand::DmRead { sender_id } => direct::mark_read(ctx, identity, sender_id).await.map(|_| ()),

        ClientCommand::DmTyping {
            recipient_id,
            user_name,
        } => {
            direct::typing(ctx, identity, recipient_id, user_name, true).await;
            Ok(())
        }

        ClientCommand::DmStopTyping {
            recipient_id,
            user_name,
        } => {
            direct::typing(ctx, identity, recipient_id, user_name, false).await;
            Ok(())
        }
    };

    if let Err(e) = outcome {
        match e {
            crate::error::ChatError::Persistence(_) => {
                warn!("{} ({}) command failed: {}", identity.username, identity.id, e)
            }
            _ => debug!("{} ({}) command dropped: {}", identity.username, identity.id, e.code()),
        }
    }
}
