//! Types shared by the tessel store, gateway, REST API and server binary.

pub mod api;
pub mod events;
pub mod models;
