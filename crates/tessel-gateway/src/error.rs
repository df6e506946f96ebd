use tessel_types::models::ChatErrorCode;

/// Failure of a single gateway operation.
///
/// Only the moderation variants are ever shown to the sender; authorization and
/// input failures are dropped silently so rooms and memberships cannot be probed.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("authentication failed")]
    AuthFailed,

    #[error("not authorized for this room")]
    Unauthorized,

    #[error("sender is muted")]
    Muted,

    #[error("chat is disabled in this channel")]
    ChatDisabled,

    #[error("channel is locked")]
    ChannelLocked,

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl ChatError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthFailed => "AUTH_FAILED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Muted => ChatErrorCode::Muted.as_str(),
            Self::ChatDisabled => ChatErrorCode::ChatDisabled.as_str(),
            Self::ChannelLocked => ChatErrorCode::ChannelLocked.as_str(),
            Self::InvalidInput(code) => code,
            Self::Persistence(_) => "PERSISTENCE_FAILURE",
        }
    }

    /// The code to report back to the sender, if this failure is visible at all.
    pub fn reject_code(&self) -> Option<ChatErrorCode> {
        match self {
            Self::Muted => Some(ChatErrorCode::Muted),
            Self::ChatDisabled => Some(ChatErrorCode::ChatDisabled),
            Self::ChannelLocked => Some(ChatErrorCode::ChannelLocked),
            _ => None,
        }
    }
}

pub const INVALID_BODY: &str = "INVALID_BODY";
pub const INVALID_ROOM: &str = "INVALID_ROOM";
pub const SELF_DM: &str = "SELF_DM";
pub const UNKNOWN_RECIPIENT: &str = "UNKNOWN_RECIPIENT";
pub const UNKNOWN_CHANNEL: &str = "UNKNOWN_CHANNEL";
