use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use tessel_types::models::{ChannelId, ProjectId, UserId};

static CHANNEL_ROOM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^channel-(\d+)$").expect("channel room pattern"));
static ROLE_ROOM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^role:([A-Za-z0-9_]+)$").expect("role room pattern"));
static USER_ROOM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^user:(\d+)$").expect("user room pattern"));
static RESOURCE_ROOM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(bug|execution)-(\d+)-(.+)$").expect("resource room pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Bug,
    Execution,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Execution => "execution",
        }
    }
}

/// A room string after classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomId {
    Channel(ChannelId),
    /// Role name, always uppercase.
    Role(String),
    /// A user's private inbox.
    User(UserId),
    /// Discussion thread attached to a bug or test execution inside a project.
    ResourceScoped {
        kind: ResourceKind,
        project_id: ProjectId,
        resource_id: String,
    },
    Invalid,
}

impl RoomId {
    /// Classify a room string. Total: every input maps to exactly one variant,
    /// and rules are tried in order (channel, role, user, resource).
    pub fn parse(room: &str) -> Self {
        if let Some(caps) = CHANNEL_ROOM.captures(room) {
            return caps[1].parse().map(Self::Channel).unwrap_or(Self::Invalid);
        }
        if let Some(caps) = ROLE_ROOM.captures(room) {
            return Self::Role(caps[1].to_uppercase());
        }
        if let Some(caps) = USER_ROOM.captures(room) {
            return caps[1].parse().map(Self::User).unwrap_or(Self::Invalid);
        }
        if let Some(caps) = RESOURCE_ROOM.captures(room) {
            let kind = match &caps[1] {
                "bug" => ResourceKind::Bug,
                _ => ResourceKind::Execution,
            };
            return match caps[2].parse() {
                Ok(project_id) => Self::ResourceScoped {
                    kind,
                    project_id,
                    resource_id: caps[3].to_string(),
                },
                Err(_) => Self::Invalid,
            };
        }
        Self::Invalid
    }

    pub fn role(name: &str) -> Self {
        Self::Role(name.to_uppercase())
    }

    /// Key used for occupancy and broadcast. `None` for `Invalid`, which can
    /// never be joined.
    pub fn canonical(&self) -> Option<String> {
        match self {
            Self::Invalid => None,
            other => Some(other.to_string()),
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(id) => write!(f, "channel-{}", id),
            Self::Role(name) => write!(f, "role:{}", name),
            Self::User(id) => write!(f, "user:{}", id),
            Self::ResourceScoped {
                kind,
                project_id,
                resource_id,
            } => write!(f, "{}-{}-{}", kind.as_str(), project_id, resource_id),
            Self::Invalid => f.write_str("<invalid>"),
        }
    }
}

/// Inbox room key for a user.
pub fn inbox(user_id: UserId) -> String {
    RoomId::User(user_id).to_string()
}
