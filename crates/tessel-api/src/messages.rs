use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use tessel_gateway::authorizer::{Intent, authorize};
use tessel_gateway::room_id::RoomId;
use tessel_types::models::{ChannelId, ChatMessage, Identity};

use crate::auth::{AppState, internal};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination: pass the `createdAt` timestamp of the
    /// oldest message from the previous page to fetch older messages.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Channel history, newest first. Non-members get 404, same as a channel
/// that does not exist.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<ChannelId>,
    Query(query): Query<MessageQuery>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, StatusCode> {
    let room = RoomId::Channel(channel_id);
    if !authorize(&state.ctx.store, &identity, &room, Intent::Join).await.is_allowed() {
        return Err(StatusCode::NOT_FOUND);
    }

    let limit = query.limit.clamp(1, 200);
    let before = query.before;
    let rows = state
        .ctx
        .store
        .call(move |db| db.get_messages(channel_id, limit, before.as_deref()))
        .await
        .map_err(internal)?;

    let messages: Vec<ChatMessage> = rows.into_iter().map(|row| row.into_model()).collect();
    Ok(Json(messages))
}
