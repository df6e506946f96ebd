use std::collections::{BTreeSet, HashMap, HashSet};

use tokio::sync::mpsc;
use uuid::Uuid;

use tessel_types::events::ServerEvent;
use tessel_types::models::{Identity, UserId};

pub type ConnId = Uuid;

struct ConnectionEntry {
    user_id: UserId,
    tx: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<String>,
}

/// What a closed connection left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub user_id: UserId,
    pub rooms: Vec<String>,
    /// True when no other connection of the same user is still open.
    pub went_offline: bool,
}

/// The authoritative connection table.
///
/// Online users and room occupancy are not stored anywhere; they are derived
/// by scanning this table each time they are asked for, so a missed cleanup
/// on one path cannot leave a user stuck online. Owned by the dispatcher,
/// which serializes access behind a single mutex.
#[derive(Default)]
pub struct PresenceTracker {
    connections: HashMap<ConnId, ConnectionEntry>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(
        &mut self,
        conn_id: ConnId,
        identity: &Identity,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) {
        self.connections.insert(
            conn_id,
            ConnectionEntry {
                user_id: identity.id,
                tx,
                rooms: HashSet::new(),
            },
        );
    }

    pub fn disconnect(&mut self, conn_id: ConnId) -> Option<Departure> {
        let entry = self.connections.remove(&conn_id)?;
        let mut rooms: Vec<String> = entry.rooms.into_iter().collect();
        rooms.sort();
        Some(Departure {
            user_id: entry.user_id,
            rooms,
            went_offline: !self.is_online(entry.user_id),
        })
    }

    /// Returns false if the connection is unknown or already in the room.
    pub fn join(&mut self, conn_id: ConnId, room: &str) -> bool {
        self.connections
            .get_mut(&conn_id)
            .is_some_and(|entry| entry.rooms.insert(room.to_string()))
    }

    /// Returns false if the connection was not in the room.
    pub fn leave(&mut self, conn_id: ConnId, room: &str) -> bool {
        self.connections
            .get_mut(&conn_id)
            .is_some_and(|entry| entry.rooms.remove(room))
    }

    /// Unsubscribe every connection of `user_id` from each room that
    /// `revoked` matches. Returns the removed (connection, room) pairs, sorted.
    pub fn evict(&mut self, user_id: UserId, revoked: impl Fn(&str) -> bool) -> Vec<(ConnId, String)> {
        let mut removed = Vec::new();
        for (conn_id, entry) in self.connections.iter_mut() {
            if entry.user_id != user_id {
                continue;
            }
            entry.rooms.retain(|room| {
                if revoked(room) {
                    removed.push((*conn_id, room.clone()));
                    false
                } else {
                    true
                }
            });
        }
        removed.sort();
        removed
    }

    pub fn user_of(&self, conn_id: ConnId) -> Option<UserId> {
        self.connections.get(&conn_id).map(|entry| entry.user_id)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.connections.values().any(|entry| entry.user_id == user_id)
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.connections
            .values()
            .filter(|entry| entry.user_id == user_id)
            .count()
    }

    /// Sorted, de-duplicated ids of every user with an open connection.
    pub fn online_users(&self) -> Vec<UserId> {
        self.connections
            .values()
            .map(|entry| entry.user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sorted, de-duplicated ids of users with at least one connection in `room`.
    pub fn room_occupants(&self, room: &str) -> Vec<UserId> {
        self.connections
            .values()
            .filter(|entry| entry.rooms.contains(room))
            .map(|entry| entry.user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn rooms_of(&self, conn_id: ConnId) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .connections
            .get(&conn_id)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Queue `event` on every connection subscribed to `room`, optionally
    /// skipping one. Returns how many connections it was queued on.
    pub fn emit_to_room(&self, room: &str, event: &ServerEvent, except: Option<ConnId>) -> usize {
        let mut delivered = 0;
        for (conn_id, entry) in &self.connections {
            if Some(*conn_id) == except || !entry.rooms.contains(room) {
                continue;
            }
            if entry.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn send_to_connection(&self, conn_id: ConnId, event: ServerEvent) -> bool {
        self.connections
            .get(&conn_id)
            .is_some_and(|entry| entry.tx.send(event).is_ok())
    }
}
