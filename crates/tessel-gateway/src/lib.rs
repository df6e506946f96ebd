//! Real-time messaging core: connection authentication, room parsing and
//! authorization, moderation, presence, channel and direct messaging.

pub mod auth;
pub mod authorizer;
pub mod connection;
pub mod direct;
pub mod dispatcher;
pub mod error;
pub mod moderation;
pub mod pipeline;
pub mod presence;
pub mod room_id;
pub mod rooms;
pub mod store;

use dispatcher::Dispatcher;
use store::Store;

/// Everything an event handler needs: the store and the fan-out dispatcher.
#[derive(Clone)]
pub struct ChatContext {
    pub store: Store,
    pub dispatcher: Dispatcher,
}

impl ChatContext {
    pub fn new(store: Store, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }
}
