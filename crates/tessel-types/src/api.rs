use serde::{Deserialize, Serialize};

use crate::models::{ChannelId, UserId};

// -- JWT Claims --

/// JWT claims shared by tessel-api (REST middleware) and tessel-gateway
/// (connection-time authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub username: String,
    pub role: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: UserId,
    pub username: String,
    pub role: String,
    pub token: String,
}

// -- Direct messages --

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

// -- Moderation --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MuteRequest {
    /// Mute duration; absent means until explicitly lifted.
    pub minutes: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ChannelFlagsRequest {
    pub is_locked: Option<bool>,
    pub is_disabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResponse {
    pub id: ChannelId,
    pub name: String,
    pub is_locked: bool,
    pub is_disabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MemberRequest {
    pub user_id: UserId,
}
