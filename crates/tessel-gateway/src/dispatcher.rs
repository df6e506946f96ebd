use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tessel_types::events::ServerEvent;
use tessel_types::models::{Identity, UserId};

use crate::presence::{ConnId, PresenceTracker};
use crate::room_id::{RoomId, inbox};

/// Manages all connected clients and fans events out to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Process-wide events (presence); every connection receives them
    broadcast_tx: broadcast::Sender<ServerEvent>,

    /// Connection table: targeted queues plus room subscriptions.
    /// Room emits happen while holding this lock, so every subscriber of a
    /// room sees that room's events in the same order.
    tracker: Mutex<PresenceTracker>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                tracker: Mutex::new(PresenceTracker::new()),
            }),
        }
    }

    /// Subscribe to process-wide events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a new connection for an authenticated identity.
    ///
    /// The connection is placed in its inbox and role rooms, and the updated
    /// online list is broadcast. Returns (conn_id, targeted receiver).
    pub async fn connect(
        &self,
        identity: &Identity,
    ) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut tracker = self.inner.tracker.lock().await;
        tracker.connect(conn_id, identity, tx);
        tracker.join(conn_id, &inbox(identity.id));
        let role_room = RoomId::role(&identity.role).to_string();
        if RoomId::parse(&role_room).is_valid() {
            tracker.join(conn_id, &role_room);
        } else {
            warn!("{} ({}) has unroutable role {:?}", identity.username, identity.id, identity.role);
        }

        info!(
            "{} ({}) online with {} connection(s)",
            identity.username,
            identity.id,
            tracker.connection_count(identity.id)
        );
        self.broadcast(ServerEvent::UserOnline {
            user_id: identity.id,
            online_users: tracker.online_users(),
        });

        (conn_id, rx)
    }

    /// Tear down a connection: leave every room it was in and, if it was the
    /// user's last one, announce them offline.
    pub async fn disconnect(&self, conn_id: ConnId) {
        let mut tracker = self.inner.tracker.lock().await;
        let Some(departure) = tracker.disconnect(conn_id) else {
            return;
        };

        for room in &departure.rooms {
            let users = tracker.room_occupants(room);
            if users.is_empty() {
                continue;
            }
            tracker.emit_to_room(
                room,
                &ServerEvent::UserLeft {
                    room: room.clone(),
                    user_id: departure.user_id,
                    users,
                },
                None,
            );
        }

        if departure.went_offline {
            info!("user {} went offline", departure.user_id);
            self.broadcast(ServerEvent::UserOffline {
                user_id: departure.user_id,
                online_users: tracker.online_users(),
            });
        }
    }

    /// Subscribe a connection to an already-authorized room and send the
    /// room a fresh occupancy snapshot.
    pub async fn join_room(&self, conn_id: ConnId, identity: &Identity, room: &str) {
        let mut tracker = self.inner.tracker.lock().await;
        if tracker.user_of(conn_id).is_none() {
            return;
        }
        if !tracker.join(conn_id, room) {
            debug!("{} ({}) already in {}", identity.username, identity.id, room);
        }
        let users = tracker.room_occupants(room);
        tracker.emit_to_room(
            room,
            &ServerEvent::UserJoined {
                room: room.to_string(),
                user_id: identity.id,
                username: identity.username.clone(),
                users,
            },
            None,
        );
    }

    /// Leaving a room the connection never joined does nothing.
    pub async fn leave_room(&self, conn_id: ConnId, room: &str) {
        let mut tracker = self.inner.tracker.lock().await;
        let Some(user_id) = tracker.user_of(conn_id) else {
            return;
        };
        if !tracker.leave(conn_id, room) {
            return;
        }
        let users = tracker.room_occupants(room);
        let event = ServerEvent::UserLeft {
            room: room.to_string(),
            user_id,
            users,
        };
        tracker.emit_to_room(room, &event, None);
        // The leaver's own connection is no longer subscribed; tell it directly.
        tracker.send_to_connection(conn_id, event);
    }

    /// Pull every connection of `user_id` out of the rooms `revoked` matches,
    /// after the user lost the membership those rooms require. Each affected
    /// room gets a `userLeft`, and so does each evicted connection. Returns
    /// how many subscriptions were dropped.
    pub async fn revoke(&self, user_id: UserId, revoked: impl Fn(&str) -> bool) -> usize {
        let mut tracker = self.inner.tracker.lock().await;
        let removed = tracker.evict(user_id, revoked);

        let rooms: BTreeSet<&str> = removed.iter().map(|(_, room)| room.as_str()).collect();
        for room in rooms {
            let event = ServerEvent::UserLeft {
                room: room.to_string(),
                user_id,
                users: tracker.room_occupants(room),
            };
            tracker.emit_to_room(room, &event, None);
            for (conn_id, _) in removed.iter().filter(|(_, r)| r == room) {
                tracker.send_to_connection(*conn_id, event.clone());
            }
        }

        if !removed.is_empty() {
            info!("user {} evicted from {} room subscription(s)", user_id, removed.len());
        }
        removed.len()
    }

    /// Deliver an event to every connection in `room`, except `except`.
    pub async fn emit_to_room(&self, room: &str, event: ServerEvent, except: Option<ConnId>) -> usize {
        let tracker = self.inner.tracker.lock().await;
        let delivered = tracker.emit_to_room(room, &event, except);
        debug!("{} -> {} ({} connection(s))", event.name(), room, delivered);
        delivered
    }

    /// Send a targeted event to every open connection of a user.
    pub async fn send_to_user(&self, user_id: UserId, event: ServerEvent) -> usize {
        self.emit_to_room(&inbox(user_id), event, None).await
    }

    /// Send an event to one connection only.
    pub async fn send_to_connection(&self, conn_id: ConnId, event: ServerEvent) -> bool {
        self.inner.tracker.lock().await.send_to_connection(conn_id, event)
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.inner.tracker.lock().await.online_users()
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.inner.tracker.lock().await.is_online(user_id)
    }

    pub async fn room_occupants(&self, room: &str) -> Vec<UserId> {
        self.inner.tracker.lock().await.room_occupants(room)
    }

    pub async fn rooms_of(&self, conn_id: ConnId) -> Vec<String> {
        self.inner.tracker.lock().await.rooms_of(conn_id)
    }
}
