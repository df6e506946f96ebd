use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::rejection::WebSocketUpgradeRejection,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

use tessel_gateway::connection;

use crate::auth::AppState;
use crate::middleware::bearer_token;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// `GET /gateway`. The credential is checked before the upgrade, so a bad
/// token gets a plain 401 and never becomes a socket. `?token=` wins over
/// the `Authorization` header since browsers cannot set headers on a
/// WebSocket handshake.
pub async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .map(str::to_string);

    let identity = match state.authenticator.authenticate(token.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => {
            debug!("Gateway upgrade refused: {}", e.code());
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let ctx = state.ctx.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx, identity))
}
