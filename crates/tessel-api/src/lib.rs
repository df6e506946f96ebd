//! REST surface around the messaging core: credentials, history and
//! moderation administration, plus the authenticated gateway upgrade.

pub mod admin;
pub mod auth;
pub mod direct;
pub mod gateway;
pub mod messages;
pub mod middleware;

use axum::{
    Router, middleware as axum_mw,
    routing::{delete, get, post, put},
};

use crate::auth::AppState;
use crate::middleware::{require_admin, require_auth};

/// Every route the server exposes. Layers for CORS and tracing are added by
/// the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/gateway", get(gateway::upgrade));

    let protected_routes = Router::new()
        .route("/channels/{channel_id}/messages", get(messages::get_messages))
        .route("/dm/{user_id}", get(direct::get_conversation))
        .route("/dm/{user_id}/read", post(direct::mark_read))
        .layer(axum_mw::from_fn_with_state(state.clone(), require_auth));

    let admin_routes = Router::new()
        .route(
            "/admin/users/{user_id}/mute",
            post(admin::mute_user).delete(admin::unmute_user),
        )
        .route("/admin/channels", post(admin::create_channel))
        .route("/admin/channels/{channel_id}/flags", put(admin::set_channel_flags))
        .route("/admin/channels/{channel_id}/members", post(admin::add_channel_member))
        .route(
            "/admin/channels/{channel_id}/members/{user_id}",
            delete(admin::remove_channel_member),
        )
        .route("/admin/projects/{project_id}/members", post(admin::add_project_member))
        .route(
            "/admin/projects/{project_id}/members/{user_id}",
            delete(admin::remove_project_member),
        )
        .layer(axum_mw::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .with_state(state)
}
