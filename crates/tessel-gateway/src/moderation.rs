use chrono::Utc;
use tracing::info;

use tessel_types::models::{ChannelId, Identity, UserId};

use crate::error::{ChatError, UNKNOWN_CHANNEL};
use crate::store::Store;

/// Mute check shared by channel and direct messages.
///
/// An expired mute is cleared in the store as part of this call and the
/// write is allowed. The clear is a single conditional UPDATE, so a mute
/// renewed concurrently is never wiped out.
pub async fn check_mute(store: &Store, user_id: UserId) -> Result<(), ChatError> {
    let Some(state) = store
        .call(move |db| Ok(db.get_mute_state(user_id)?.map(|row| row.into_model())))
        .await?
    else {
        return Ok(());
    };

    if !state.is_muted {
        return Ok(());
    }

    let now = Utc::now();
    match state.muted_until {
        Some(until) if until <= now => {
            let cleared = store
                .call(move |db| db.clear_expired_mute(user_id, now))
                .await?;
            if cleared {
                info!("Mute for user {} expired at {}, cleared", user_id, until);
                return Ok(());
            }
            // Someone changed the mute between our read and the clear.
            let still_muted = store
                .call(move |db| Ok(db.get_mute_state(user_id)?.is_some_and(|row| row.is_muted)))
                .await?;
            if still_muted { Err(ChatError::Muted) } else { Ok(()) }
        }
        _ => Err(ChatError::Muted),
    }
}

/// Full pre-write check for a channel message: mute, then disable, then lock.
/// Admins bypass disable and lock but not mute.
pub async fn check_channel_write(
    store: &Store,
    identity: &Identity,
    channel_id: ChannelId,
) -> Result<(), ChatError> {
    check_mute(store, identity.id).await?;

    let flags = store
        .call(move |db| db.channel_flags(channel_id))
        .await?
        .ok_or(ChatError::InvalidInput(UNKNOWN_CHANNEL))?;

    if identity.is_admin() {
        return Ok(());
    }
    if flags.is_disabled {
        return Err(ChatError::ChatDisabled);
    }
    if flags.is_locked {
        return Err(ChatError::ChannelLocked);
    }
    Ok(())
}
