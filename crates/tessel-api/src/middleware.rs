use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};

use tessel_types::models::Identity;

use crate::auth::AppState;

/// Pull the token out of an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Verify the bearer token and attach the caller's `Identity` to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(req.headers()).map(str::to_string);
    let identity = state
        .authenticator
        .authenticate(token.as_deref())
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Like `require_auth`, then also demand the admin role.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(req.headers()).map(str::to_string);
    let identity: Identity = state
        .authenticator
        .authenticate(token.as_deref())
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    if !identity.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
