use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use tessel_api::auth::{AppState, AppStateInner};
use tessel_db::Database;
use tessel_gateway::ChatContext;
use tessel_gateway::auth::SessionAuthenticator;
use tessel_gateway::dispatcher::Dispatcher;
use tessel_gateway::store::Store;
use tessel_types::models::MessageType;

const SECRET: &str = "route-test-secret";

fn app() -> (Router, AppState) {
    let store = Store::new(Database::open_in_memory().unwrap());
    let state: AppState = Arc::new(AppStateInner {
        ctx: ChatContext::new(store.clone(), Dispatcher::new()),
        authenticator: SessionAuthenticator::new(SECRET, store),
        jwt_secret: SECRET.into(),
        token_ttl_days: 1,
    });
    (tessel_api::router(state.clone()), state)
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

async fn register(app: &Router, username: &str) -> (i64, String) {
    let (status, body) = call(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": username, "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    (body["userId"].as_i64().unwrap(), body["token"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn first_account_administers() {
    let (app, _) = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": "root", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "ADMIN");

    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": "alice", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "TESTER");

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": "alice", "password": "another one" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn login_checks_password() {
    let (app, _) = app();
    register(&app, "alice").await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn missing_credentials_are_rejected() {
    let (app, _) = app();
    let (status, _) = call(&app, Method::GET, "/channels/1/messages", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, Method::GET, "/channels/1/messages", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, Method::GET, "/gateway", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, Method::GET, "/gateway?token=garbage", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_need_admin_role() {
    let (app, _) = app();
    let (_, root) = register(&app, "root").await;
    let (alice_id, alice) = register(&app, "alice").await;

    let uri = format!("/admin/users/{alice_id}/mute");
    let (status, _) = call(&app, Method::POST, &uri, Some(&alice), Some(json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::POST, &uri, Some(&root), Some(json!({ "minutes": 10, "reason": "spam" })))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::DELETE, &uri, Some(&root), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, Method::POST, "/admin/users/999/mute", Some(&root), Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn out_of_range_mute_is_a_bad_request() {
    let (app, state) = app();
    let (_, root) = register(&app, "root").await;
    let (alice_id, _) = register(&app, "alice").await;

    let uri = format!("/admin/users/{alice_id}/mute");
    for minutes in [0, -5, 1_000_000_000_000, i64::MAX] {
        let (status, _) = call(&app, Method::POST, &uri, Some(&root), Some(json!({ "minutes": minutes }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "minutes = {minutes}");
    }
    assert!(!state.ctx.store.db().get_mute_state(alice_id).unwrap().unwrap().is_muted);
}

#[tokio::test]
async fn removing_a_member_ends_their_live_subscription() {
    let (app, state) = app();
    let (_, root) = register(&app, "root").await;
    let (alice_id, alice_token) = register(&app, "alice").await;
    let (_, channel) = call(&app, Method::POST, "/admin/channels", Some(&root), Some(json!({ "name": "qa" }))).await;
    let channel_id = channel["id"].as_i64().unwrap();
    let uri = format!("/admin/channels/{channel_id}/members");
    call(&app, Method::POST, &uri, Some(&root), Some(json!({ "userId": alice_id }))).await;

    let alice = state
        .authenticator
        .authenticate(Some(alice_token.as_str()))
        .await
        .unwrap();
    let (conn, mut rx) = state.ctx.dispatcher.connect(&alice).await;
    tessel_gateway::rooms::join(&state.ctx, conn, &alice, &format!("channel-{channel_id}")).await;
    assert_eq!(state.ctx.dispatcher.room_occupants(&format!("channel-{channel_id}")).await, vec![alice_id]);

    let (status, _) = call(&app, Method::DELETE, &format!("{uri}/{alice_id}"), Some(&root), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(state.ctx.dispatcher.room_occupants(&format!("channel-{channel_id}")).await.is_empty());

    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev.name());
    }
    assert_eq!(events, vec!["userJoined", "userLeft"]);
}

#[tokio::test]
async fn channel_history_is_members_only() {
    let (app, state) = app();
    let (_, root) = register(&app, "root").await;
    let (alice_id, alice) = register(&app, "alice").await;
    let (_, bob) = register(&app, "bob").await;

    let (status, channel) = call(
        &app,
        Method::POST,
        "/admin/channels",
        Some(&root),
        Some(json!({ "name": "release-42" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let channel_id = channel["id"].as_i64().unwrap();

    let uri = format!("/admin/channels/{channel_id}/members");
    let (status, _) = call(&app, Method::POST, &uri, Some(&root), Some(json!({ "userId": alice_id }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for body in ["first", "second", "third"] {
        state
            .ctx
            .store
            .db()
            .insert_message(channel_id, alice_id, body, MessageType::General, None)
            .unwrap();
    }

    let uri = format!("/channels/{channel_id}/messages?limit=2");
    let (status, page) = call(&app, Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let bodies: Vec<&str> = page.as_array().unwrap().iter().map(|m| m["body"].as_str().unwrap()).collect();
    assert_eq!(bodies, vec!["third", "second"]);

    let (status, _) = call(&app, Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, Method::GET, "/channels/404/messages", Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn channel_flags_update_partially() {
    let (app, _) = app();
    let (_, root) = register(&app, "root").await;
    let (_, channel) = call(&app, Method::POST, "/admin/channels", Some(&root), Some(json!({ "name": "ops" }))).await;
    let uri = format!("/admin/channels/{}/flags", channel["id"]);

    let (status, body) = call(&app, Method::PUT, &uri, Some(&root), Some(json!({ "isLocked": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLocked"], true);
    assert_eq!(body["isDisabled"], false);

    let (_, body) = call(&app, Method::PUT, &uri, Some(&root), Some(json!({ "isDisabled": true }))).await;
    assert_eq!(body["isLocked"], true);
    assert_eq!(body["isDisabled"], true);

    let (status, _) = call(&app, Method::PUT, "/admin/channels/999/flags", Some(&root), Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dm_read_over_rest() {
    let (app, state) = app();
    let (alice_id, alice) = register(&app, "alice").await;
    let (bob_id, bob) = register(&app, "bob").await;
    let db = state.ctx.store.db();
    db.insert_direct_message(bob_id, alice_id, "one", None).unwrap();
    db.insert_direct_message(bob_id, alice_id, "two", None).unwrap();

    let (status, conversation) = call(&app, Method::GET, &format!("/dm/{bob_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conversation.as_array().unwrap().len(), 2);

    let uri = format!("/dm/{bob_id}/read");
    let (_, body) = call(&app, Method::POST, &uri, Some(&alice), None).await;
    assert_eq!(body, json!({ "updated": 2 }));
    let (_, body) = call(&app, Method::POST, &uri, Some(&alice), None).await;
    assert_eq!(body, json!({ "updated": 0 }));

    let (_, body) = call(&app, Method::POST, &format!("/dm/{alice_id}/read"), Some(&bob), None).await;
    assert_eq!(body, json!({ "updated": 0 }));
}
