use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use tessel_gateway::direct;
use tessel_types::api::MarkReadResponse;
use tessel_types::models::{DirectMessage, Identity, UserId};

use crate::auth::{AppState, internal};

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// Both sides of the caller's conversation with `other`, newest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(other): Path<UserId>,
    Query(query): Query<ConversationQuery>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, StatusCode> {
    let (me, limit) = (identity.id, query.limit.clamp(1, 200));
    let rows = state
        .ctx
        .store
        .call(move |db| db.get_direct_messages(me, other, limit))
        .await
        .map_err(internal)?;

    let messages: Vec<DirectMessage> = rows.into_iter().map(|row| row.into_model()).collect();
    Ok(Json(messages))
}

/// Same as the `dm_read` event, including the receipt pushed to `other`.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(other): Path<UserId>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, StatusCode> {
    let updated = direct::mark_read(&state.ctx, &identity, other)
        .await
        .map_err(internal)?;
    Ok(Json(MarkReadResponse { updated }))
}
