/// End-to-end gateway scenarios: commands go in as client JSON, and each
/// fake connection's outbound queue is inspected for what it would receive.
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use tessel_db::Database;
use tessel_gateway::ChatContext;
use tessel_gateway::connection::handle_command;
use tessel_gateway::dispatcher::Dispatcher;
use tessel_gateway::presence::ConnId;
use tessel_gateway::rooms;
use tessel_gateway::store::Store;
use tessel_types::events::{ClientCommand, ServerEvent};
use tessel_types::models::{ChatErrorCode, Identity};

struct Client {
    identity: Identity,
    conn: ConnId,
    rx: UnboundedReceiver<ServerEvent>,
}

impl Client {
    async fn connect(ctx: &ChatContext, identity: &Identity) -> Self {
        let (conn, rx) = ctx.dispatcher.connect(identity).await;
        Self {
            identity: identity.clone(),
            conn,
            rx,
        }
    }

    async fn send(&self, ctx: &ChatContext, command: serde_json::Value) {
        let cmd: ClientCommand = serde_json::from_value(command).unwrap();
        handle_command(ctx, self.conn, &self.identity, cmd).await;
    }

    fn events(&mut self) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn messages(&mut self) -> Vec<ServerEvent> {
        self.events()
            .into_iter()
            .filter(|ev| matches!(ev, ServerEvent::Message(_)))
            .collect()
    }
}

struct World {
    ctx: ChatContext,
    alice: Identity,
    bob: Identity,
    carol: Identity,
    admin: Identity,
}

/// Channels 1..=7 exist; alice and carol are members of 5 and 7.
fn world() -> World {
    let db = Database::open_in_memory().unwrap();
    let alice = db.create_user("alice", "x", "TESTER").unwrap();
    let bob = db.create_user("bob", "x", "DEVELOPER").unwrap();
    let carol = db.create_user("carol", "x", "TESTER").unwrap();
    let admin = db.create_user("root", "x", "ADMIN").unwrap();
    for n in 1..=7 {
        db.create_channel(&format!("channel {n}")).unwrap();
    }
    for channel in [5, 7] {
        db.add_channel_member(channel, alice).unwrap();
        db.add_channel_member(channel, carol).unwrap();
    }
    World {
        ctx: ChatContext::new(Store::new(db), Dispatcher::new()),
        alice: Identity::new(alice, "alice", "TESTER"),
        bob: Identity::new(bob, "bob", "DEVELOPER"),
        carol: Identity::new(carol, "carol", "TESTER"),
        admin: Identity::new(admin, "root", "ADMIN"),
    }
}

#[tokio::test]
async fn member_message_reaches_every_subscriber() {
    let w = world();
    let mut a = Client::connect(&w.ctx, &w.alice).await;
    let mut c = Client::connect(&w.ctx, &w.carol).await;
    a.send(&w.ctx, json!({ "event": "joinRoom", "data": "channel-5" })).await;
    c.send(&w.ctx, json!({ "event": "joinRoom", "data": "channel-5" })).await;
    a.events();
    c.events();

    a.send(&w.ctx, json!({ "event": "message", "data": { "room": "channel-5", "body": "hi" } }))
        .await;

    for client in [&mut a, &mut c] {
        match client.messages().as_slice() {
            [ServerEvent::Message(m)] => {
                assert_eq!(m.sender_id, w.alice.id);
                assert_eq!(m.body, "hi");
                assert_eq!(m.channel_id, Some(5));
            }
            other => panic!("expected one message, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn outsider_neither_sends_nor_receives() {
    let w = world();
    let mut a = Client::connect(&w.ctx, &w.alice).await;
    let mut b = Client::connect(&w.ctx, &w.bob).await;
    a.send(&w.ctx, json!({ "event": "joinRoom", "data": "channel-5" })).await;
    b.send(&w.ctx, json!({ "event": "joinRoom", "data": "channel-5" })).await;
    a.events();
    assert!(b.events().is_empty());

    b.send(&w.ctx, json!({ "event": "message", "data": { "room": "channel-5", "body": "let me in" } }))
        .await;
    assert!(a.events().is_empty());
    assert!(b.events().is_empty());
    assert_eq!(w.ctx.store.db().count_messages(5).unwrap(), 0);

    a.send(&w.ctx, json!({ "event": "message", "data": { "room": "channel-5", "body": "members only" } }))
        .await;
    assert_eq!(a.messages().len(), 1);
    assert!(b.events().is_empty());
}

#[tokio::test]
async fn removed_member_stops_receiving_at_once() {
    let w = world();
    let mut a = Client::connect(&w.ctx, &w.alice).await;
    let mut c = Client::connect(&w.ctx, &w.carol).await;
    a.send(&w.ctx, json!({ "event": "joinRoom", "data": "channel-5" })).await;
    c.send(&w.ctx, json!({ "event": "joinRoom", "data": "channel-5" })).await;
    a.events();
    c.events();

    assert!(w.ctx.store.db().remove_channel_member(5, w.alice.id).unwrap());
    assert_eq!(rooms::revoke_channel(&w.ctx, 5, w.alice.id).await, 1);
    let left = ServerEvent::UserLeft { room: "channel-5".into(), user_id: w.alice.id, users: vec![w.carol.id] };
    assert_eq!(a.events(), vec![left.clone()]);
    assert_eq!(c.events(), vec![left]);

    c.send(&w.ctx, json!({ "event": "message", "data": { "room": "channel-5", "body": "secret" } }))
        .await;
    assert_eq!(c.messages().len(), 1);
    assert!(a.events().is_empty());
}

#[tokio::test]
async fn deactivated_project_member_leaves_resource_rooms() {
    let w = world();
    let db = w.ctx.store.db();
    db.add_project_member(12, w.alice.id).unwrap();
    db.add_project_member(12, w.bob.id).unwrap();
    let mut a = Client::connect(&w.ctx, &w.alice).await;
    let mut b = Client::connect(&w.ctx, &w.bob).await;
    for room in ["bug-12-301", "execution-12-run-7"] {
        a.send(&w.ctx, json!({ "event": "joinRoom", "data": room })).await;
        b.send(&w.ctx, json!({ "event": "joinRoom", "data": room })).await;
    }
    a.send(&w.ctx, json!({ "event": "joinRoom", "data": "channel-5" })).await;
    a.events();
    b.events();

    assert!(db.deactivate_project_member(12, w.alice.id).unwrap());
    assert_eq!(rooms::revoke_project(&w.ctx, 12, w.alice.id).await, 2);
    assert_eq!(
        w.ctx.dispatcher.rooms_of(a.conn).await,
        vec!["channel-5".to_string(), "role:TESTER".to_string(), format!("user:{}", w.alice.id)]
    );

    b.send(&w.ctx, json!({ "event": "message", "data": { "room": "bug-12-301", "body": "fixed in 4.2" } }))
        .await;
    assert!(a.messages().is_empty());
}

#[tokio::test]
async fn muted_user_cannot_reach_role_room() {
    let w = world();
    w.ctx.store.db().mute_user(w.alice.id, None, Some("spam")).unwrap();
    let mut a = Client::connect(&w.ctx, &w.alice).await;
    let mut c = Client::connect(&w.ctx, &w.carol).await;
    let mut root = Client::connect(&w.ctx, &w.admin).await;

    a.send(
        &w.ctx,
        json!({ "event": "message", "data": { "room": "role:TESTER", "body": "spam!", "type": "ANNOUNCEMENT" } }),
    )
    .await;

    assert_eq!(
        a.events(),
        vec![ServerEvent::ChatError {
            error: ChatErrorCode::Muted,
            channel_id: None,
            room: Some("role:TESTER".into()),
        }]
    );
    assert!(c.events().is_empty());
    assert!(root.events().is_empty());
}

#[tokio::test]
async fn disabled_channel_reports_to_sender_only() {
    let w = world();
    w.ctx.store.db().set_channel_flags(7, None, Some(true)).unwrap();

    let mut a = Client::connect(&w.ctx, &w.alice).await;
    let mut c = Client::connect(&w.ctx, &w.carol).await;
    let mut root = Client::connect(&w.ctx, &w.admin).await;
    a.send(&w.ctx, json!({ "event": "joinRoom", "data": "channel-7" })).await;
    c.send(&w.ctx, json!({ "event": "joinRoom", "data": "channel-7" })).await;
    a.events();
    c.events();
    root.events();

    a.send(&w.ctx, json!({ "event": "message", "data": { "room": "channel-7", "body": "anyone?" } }))
        .await;

    assert_eq!(
        a.events(),
        vec![ServerEvent::ChatError { error: ChatErrorCode::ChatDisabled, channel_id: Some(7), room: None }]
    );
    assert!(c.events().is_empty());
    assert_eq!(w.ctx.store.db().count_messages(7).unwrap(), 0);

    let wire = serde_json::to_value(ServerEvent::ChatError {
        error: ChatErrorCode::ChatDisabled,
        channel_id: Some(7),
        room: None,
    })
    .unwrap();
    assert_eq!(wire["data"], json!({ "error": "CHAT_DISABLED", "channelId": 7 }));
}

#[tokio::test]
async fn locked_channel_still_accepts_admin() {
    let w = world();
    let db = w.ctx.store.db();
    db.set_channel_flags(7, Some(true), None).unwrap();
    db.add_channel_member(7, w.admin.id).unwrap();

    let mut a = Client::connect(&w.ctx, &w.alice).await;
    let mut root = Client::connect(&w.ctx, &w.admin).await;
    a.send(&w.ctx, json!({ "event": "joinRoom", "data": "channel-7" })).await;
    root.send(&w.ctx, json!({ "event": "joinRoom", "data": "channel-7" })).await;
    a.events();
    root.events();

    a.send(&w.ctx, json!({ "event": "message", "data": { "room": "channel-7", "body": "hello" } }))
        .await;
    assert_eq!(
        a.events(),
        vec![ServerEvent::ChatError { error: ChatErrorCode::ChannelLocked, channel_id: Some(7), room: None }]
    );

    root.send(&w.ctx, json!({ "event": "message", "data": { "room": "channel-7", "body": "frozen for release" } }))
        .await;
    assert_eq!(a.messages().len(), 1);
}

#[tokio::test]
async fn self_dm_emits_nothing() {
    let w = world();
    let mut c = Client::connect(&w.ctx, &w.carol).await;
    c.send(
        &w.ctx,
        json!({ "event": "dm_message", "data": { "recipientId": w.carol.id, "body": "note to self" } }),
    )
    .await;
    assert!(c.events().is_empty());
    assert!(w.ctx.store.db().get_direct_messages(w.carol.id, w.carol.id, 10).unwrap().is_empty());
}

#[tokio::test]
async fn dm_round_trip_with_read_receipt() {
    let w = world();
    let mut a = Client::connect(&w.ctx, &w.alice).await;
    let mut b = Client::connect(&w.ctx, &w.bob).await;

    a.send(&w.ctx, json!({ "event": "dm_message", "data": { "recipientId": w.bob.id, "body": "build is red" } }))
        .await;
    let dm = match b.events().as_slice() {
        [ServerEvent::DmMessage(dm)] => dm.clone(),
        other => panic!("expected a DM, got {other:?}"),
    };
    assert_eq!(a.events(), vec![ServerEvent::DmMessage(dm.clone())]);

    b.send(&w.ctx, json!({ "event": "dm_read", "data": { "senderId": w.alice.id } })).await;
    b.send(&w.ctx, json!({ "event": "dm_read", "data": { "senderId": w.alice.id } })).await;
    let receipts: Vec<usize> = a
        .events()
        .into_iter()
        .filter_map(|ev| match ev {
            ServerEvent::DmRead { reader_id, updated, .. } if reader_id == w.bob.id => Some(updated),
            _ => None,
        })
        .collect();
    assert_eq!(receipts, vec![1, 0]);
}

#[tokio::test]
async fn mention_alert_reaches_inbox_once() {
    let w = world();
    let mut a = Client::connect(&w.ctx, &w.alice).await;
    let mut c = Client::connect(&w.ctx, &w.carol).await;
    a.send(&w.ctx, json!({ "event": "joinRoom", "data": "channel-5" })).await;
    a.events();

    a.send(
        &w.ctx,
        json!({ "event": "message", "data": { "room": "channel-5", "body": "@carol hello @carol @nobody" } }),
    )
    .await;

    let alerts: Vec<_> = c
        .events()
        .into_iter()
        .filter(|ev| matches!(ev, ServerEvent::NotificationNew { .. }))
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(w.ctx.store.db().get_notifications(w.carol.id).unwrap().len(), 1);
}

#[tokio::test]
async fn presence_follows_open_connections() {
    let w = world();
    let mut global = w.ctx.dispatcher.subscribe();
    let clients = vec![
        Client::connect(&w.ctx, &w.alice).await,
        Client::connect(&w.ctx, &w.alice).await,
        Client::connect(&w.ctx, &w.alice).await,
    ];
    assert_eq!(w.ctx.dispatcher.online_users().await, vec![w.alice.id]);

    let conns: Vec<ConnId> = clients.iter().map(|c| c.conn).collect();
    w.ctx.dispatcher.disconnect(conns[0]).await;
    w.ctx.dispatcher.disconnect(conns[1]).await;
    assert!(w.ctx.dispatcher.is_online(w.alice.id).await);
    w.ctx.dispatcher.disconnect(conns[2]).await;
    assert!(!w.ctx.dispatcher.is_online(w.alice.id).await);

    let mut offline = 0;
    while let Ok(ev) = global.try_recv() {
        if let ServerEvent::UserOffline { user_id, online_users } = ev {
            assert_eq!(user_id, w.alice.id);
            assert!(online_users.is_empty());
            offline += 1;
        }
    }
    assert_eq!(offline, 1);
}

#[tokio::test]
async fn resource_room_requires_project_assignment() {
    let w = world();
    w.ctx.store.db().add_project_member(12, w.bob.id).unwrap();
    let mut a = Client::connect(&w.ctx, &w.alice).await;
    let mut b = Client::connect(&w.ctx, &w.bob).await;

    a.send(&w.ctx, json!({ "event": "joinRoom", "data": "bug-12-301" })).await;
    b.send(&w.ctx, json!({ "event": "joinRoom", "data": "bug-12-301" })).await;
    b.events();
    assert!(a.events().is_empty());

    b.send(
        &w.ctx,
        json!({ "event": "message", "data": { "room": "bug-12-301", "body": "repro attached", "type": "BUG_DISCUSSION" } }),
    )
    .await;
    assert_eq!(b.messages().len(), 1);
    assert!(a.events().is_empty());

    a.send(&w.ctx, json!({ "event": "typing", "data": "bug-12-301" })).await;
    assert!(b.events().is_empty());
}
