use tracing::{debug, warn};

use tessel_types::models::Identity;

use crate::room_id::RoomId;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Join,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotChannelMember,
    RoleMismatch,
    NotInboxOwner,
    NotProjectMember,
    InvalidRoom,
    LookupFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Decide whether `identity` may join or post to `room`.
///
/// Never fails: a store error while looking up membership is a denial.
/// Callers treat every denial as a silent drop.
pub async fn authorize(store: &Store, identity: &Identity, room: &RoomId, intent: Intent) -> Decision {
    let decision = match room {
        RoomId::Channel(channel_id) => {
            let (channel_id, user_id) = (*channel_id, identity.id);
            match store
                .call(move |db| db.is_channel_member(channel_id, user_id))
                .await
            {
                Ok(true) => Decision::Allow,
                Ok(false) => Decision::Deny(DenyReason::NotChannelMember),
                Err(e) => {
                    warn!("Channel membership lookup failed for {}: {}", identity.id, e);
                    Decision::Deny(DenyReason::LookupFailed)
                }
            }
        }

        RoomId::Role(name) => {
            if *name == identity.role {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::RoleMismatch)
            }
        }

        RoomId::User(user_id) => {
            if *user_id == identity.id {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotInboxOwner)
            }
        }

        RoomId::ResourceScoped { project_id, .. } => {
            let (project_id, user_id) = (*project_id, identity.id);
            match store
                .call(move |db| db.is_project_member(user_id, project_id))
                .await
            {
                Ok(true) => Decision::Allow,
                Ok(false) => Decision::Deny(DenyReason::NotProjectMember),
                Err(e) => {
                    warn!("Project membership lookup failed for {}: {}", identity.id, e);
                    Decision::Deny(DenyReason::LookupFailed)
                }
            }
        }

        RoomId::Invalid => Decision::Deny(DenyReason::InvalidRoom),
    };

    if let Decision::Deny(reason) = decision {
        debug!(
            "{} ({}) denied {:?} on {}: {:?}",
            identity.username, identity.id, intent, room, reason
        );
    }

    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_db::Database;

    fn setup() -> (Store, Identity, Identity) {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("alice", "x", "TESTER").unwrap();
        let b = db.create_user("bob", "x", "DEVELOPER").unwrap();
        let channel = db.create_channel("qa").unwrap();
        db.add_channel_member(channel, a).unwrap();
        db.add_project_member(4, a).unwrap();
        (
            Store::new(db),
            Identity::new(a, "alice", "TESTER"),
            Identity::new(b, "bob", "DEVELOPER"),
        )
    }

    #[tokio::test]
    async fn channel_requires_membership() {
        let (store, alice, bob) = setup();
        let room = RoomId::Channel(1);
        assert_eq!(authorize(&store, &alice, &room, Intent::Post).await, Decision::Allow);
        assert_eq!(
            authorize(&store, &bob, &room, Intent::Join).await,
            Decision::Deny(DenyReason::NotChannelMember)
        );
    }

    #[tokio::test]
    async fn role_room_requires_same_role() {
        let (store, alice, bob) = setup();
        let room = RoomId::parse("role:tester");
        assert!(authorize(&store, &alice, &room, Intent::Join).await.is_allowed());
        assert_eq!(
            authorize(&store, &bob, &room, Intent::Join).await,
            Decision::Deny(DenyReason::RoleMismatch)
        );
    }

    #[tokio::test]
    async fn inbox_is_private_to_its_owner() {
        let (store, alice, bob) = setup();
        let room = RoomId::User(alice.id);
        assert!(authorize(&store, &alice, &room, Intent::Join).await.is_allowed());
        assert_eq!(
            authorize(&store, &bob, &room, Intent::Post).await,
            Decision::Deny(DenyReason::NotInboxOwner)
        );
    }

    #[tokio::test]
    async fn resource_room_requires_project_assignment() {
        let (store, alice, bob) = setup();
        let room = RoomId::parse("bug-4-88");
        assert!(authorize(&store, &alice, &room, Intent::Join).await.is_allowed());
        assert_eq!(
            authorize(&store, &bob, &room, Intent::Join).await,
            Decision::Deny(DenyReason::NotProjectMember)
        );
        let other_project = RoomId::parse("execution-5-1");
        assert!(!authorize(&store, &alice, &other_project, Intent::Join).await.is_allowed());
    }

    #[tokio::test]
    async fn invalid_room_is_always_denied() {
        let (store, alice, _) = setup();
        assert_eq!(
            authorize(&store, &alice, &RoomId::Invalid, Intent::Join).await,
            Decision::Deny(DenyReason::InvalidRoom)
        );
    }
}
