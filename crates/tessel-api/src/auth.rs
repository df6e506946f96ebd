use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, info};

use tessel_gateway::ChatContext;
use tessel_gateway::auth::{SessionAuthenticator, create_token};
use tessel_gateway::error::ChatError;
use tessel_types::api::{AuthResponse, LoginRequest, RegisterRequest};
use tessel_types::models::Identity;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub ctx: ChatContext,
    pub authenticator: SessionAuthenticator,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
}

/// Store failures become 500; everything else is already handled by callers.
pub(crate) fn internal(e: ChatError) -> StatusCode {
    error!("request failed: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Check if username is taken
    let username = req.username.clone();
    if state
        .ctx
        .store
        .call(move |db| db.get_user_by_username(&username))
        .await
        .map_err(internal)?
        .is_some()
    {
        return Err(StatusCode::CONFLICT);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .to_string();

    // The first account on a fresh install administers it. A concurrent
    // signup may have taken the name while we were hashing.
    let username = req.username.clone();
    let (user_id, role) = state
        .ctx
        .store
        .call(move |db| db.register_user(&username, &password_hash))
        .await
        .map_err(internal)?
        .ok_or(StatusCode::CONFLICT)?;

    let identity = Identity::new(user_id, req.username, role);
    let token = create_token(&state.jwt_secret, &identity, state.token_ttl_days)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    info!("registered {} ({}) as {}", identity.username, identity.id, identity.role);
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id: identity.id,
            username: identity.username,
            role: identity.role,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let username = req.username.clone();
    let user = state
        .ctx
        .store
        .call(move |db| db.get_user_by_username(&username))
        .await
        .map_err(internal)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify password
    let parsed_hash =
        PasswordHash::new(&user.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let identity = Identity::new(user.id, user.username, &user.role);
    let token = create_token(&state.jwt_secret, &identity, state.token_ttl_days)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(AuthResponse {
        user_id: identity.id,
        username: identity.username,
        role: identity.role,
        token,
    }))
}
