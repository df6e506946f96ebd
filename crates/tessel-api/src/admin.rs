//! Moderation and membership administration. Every route here sits behind
//! `require_admin`; nothing in this module re-checks the role.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use tracing::info;

use tessel_gateway::rooms;
use tessel_types::api::{ChannelFlagsRequest, ChannelResponse, CreateChannelRequest, MemberRequest, MuteRequest};
use tessel_types::models::{ChannelId, Identity, ProjectId, UserId};

use crate::auth::{AppState, internal};

pub async fn mute_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Extension(admin): Extension<Identity>,
    Json(req): Json<MuteRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let until = match req.minutes {
        Some(m) if m <= 0 => return Err(StatusCode::BAD_REQUEST),
        Some(m) => Some(
            Duration::try_minutes(m)
                .and_then(|d| Utc::now().checked_add_signed(d))
                .ok_or(StatusCode::BAD_REQUEST)?,
        ),
        None => None,
    };
    let reason = req.reason;
    let found = state
        .ctx
        .store
        .call(move |db| db.mute_user(user_id, until, reason.as_deref()))
        .await
        .map_err(internal)?;
    if !found {
        return Err(StatusCode::NOT_FOUND);
    }

    match until {
        Some(until) => info!("{} muted user {} until {}", admin.username, user_id, until),
        None => info!("{} muted user {} indefinitely", admin.username, user_id),
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unmute_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Extension(admin): Extension<Identity>,
) -> Result<impl IntoResponse, StatusCode> {
    if !state
        .ctx
        .store
        .call(move |db| db.unmute_user(user_id))
        .await
        .map_err(internal)?
    {
        return Err(StatusCode::NOT_FOUND);
    }
    info!("{} unmuted user {}", admin.username, user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(admin): Extension<Identity>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > 64 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let channel = state
        .ctx
        .store
        .call(move |db| {
            let id = db.create_channel(&name)?;
            db.get_channel(id)
        })
        .await
        .map_err(internal)?
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    info!("{} created channel {} ({})", admin.username, channel.name, channel.id);
    Ok((
        StatusCode::CREATED,
        Json(ChannelResponse {
            id: channel.id,
            name: channel.name,
            is_locked: channel.is_locked,
            is_disabled: channel.is_disabled,
        }),
    ))
}

/// Lock or disable a channel. Takes effect on the next message; nobody is
/// removed from the room.
pub async fn set_channel_flags(
    State(state): State<AppState>,
    Path(channel_id): Path<ChannelId>,
    Extension(admin): Extension<Identity>,
    Json(req): Json<ChannelFlagsRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let (is_locked, is_disabled) = (req.is_locked, req.is_disabled);
    let channel = state
        .ctx
        .store
        .call(move |db| {
            if !db.set_channel_flags(channel_id, is_locked, is_disabled)? {
                return Ok(None);
            }
            db.get_channel(channel_id)
        })
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    info!(
        "{} set channel {} locked={} disabled={}",
        admin.username, channel.id, channel.is_locked, channel.is_disabled
    );
    Ok(Json(ChannelResponse {
        id: channel.id,
        name: channel.name,
        is_locked: channel.is_locked,
        is_disabled: channel.is_disabled,
    }))
}

pub async fn add_channel_member(
    State(state): State<AppState>,
    Path(channel_id): Path<ChannelId>,
    Json(req): Json<MemberRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = req.user_id;
    let added = state
        .ctx
        .store
        .call(move |db| {
            if db.get_channel(channel_id)?.is_none() || !db.user_exists(user_id)? {
                return Ok(false);
            }
            db.add_channel_member(channel_id, user_id)?;
            Ok(true)
        })
        .await
        .map_err(internal)?;
    if !added {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Removal also drops the user's open subscriptions to the channel room.
pub async fn remove_channel_member(
    State(state): State<AppState>,
    Path((channel_id, user_id)): Path<(ChannelId, UserId)>,
) -> Result<impl IntoResponse, StatusCode> {
    if !state
        .ctx
        .store
        .call(move |db| db.remove_channel_member(channel_id, user_id))
        .await
        .map_err(internal)?
    {
        return Err(StatusCode::NOT_FOUND);
    }
    rooms::revoke_channel(&state.ctx, channel_id, user_id).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_project_member(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Json(req): Json<MemberRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = req.user_id;
    let added = state
        .ctx
        .store
        .call(move |db| {
            if !db.user_exists(user_id)? {
                return Ok(false);
            }
            db.add_project_member(project_id, user_id)?;
            Ok(true)
        })
        .await
        .map_err(internal)?;
    if !added {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_project_member(
    State(state): State<AppState>,
    Path((project_id, user_id)): Path<(ProjectId, UserId)>,
) -> Result<impl IntoResponse, StatusCode> {
    if !state
        .ctx
        .store
        .call(move |db| db.deactivate_project_member(project_id, user_id))
        .await
        .map_err(internal)?
    {
        return Err(StatusCode::NOT_FOUND);
    }
    rooms::revoke_project(&state.ctx, project_id, user_id).await;
    Ok(StatusCode::NO_CONTENT)
}
