//! Integration tests for the REST surface.
//!
//! These tests drive the full router over the in-memory store:
//! - Guest issuance and user lookup
//! - Session creation and message submission
//! - Session projections and listings

use axum::http::StatusCode;
use axum_test::TestServer;
use qa_relay::AppState;
use qa_relay::config::AppConfig;
use qa_relay::directory::UserPublic;
use qa_relay::persistence::providers::memory::InMemoryStore;
use qa_relay::server::build_router;
use qa_relay::session::{Session, SessionSummary};
use serde_json::{Value, json};
use std::sync::Arc;

// =============================================================================
// Test Utilities
// =============================================================================

fn test_server() -> TestServer {
    let config = AppConfig::load_from_args(["qa-relay"]).expect("default config");
    let state = AppState::new(Arc::new(InMemoryStore::new()), Arc::new(config));
    TestServer::new(build_router(state)).expect("test server")
}

async fn guest(server: &TestServer) -> UserPublic {
    let response = server.post("/guest-user").await;
    response.assert_status_ok();
    response.json::<UserPublic>()
}

async fn submit(server: &TestServer, body: Value) -> Session {
    let response = server.post("/submit").json(&body).await;
    response.assert_status_ok();
    response.json::<Session>()
}

// =============================================================================
// Users
// =============================================================================

#[tokio::test]
async fn test_guest_user_exposes_only_public_fields() {
    let server = test_server();

    let response = server.post("/guest-user").await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    let fields: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(fields.len(), 3);
    for key in ["uuid", "displayName", "avatarUrl"] {
        assert!(fields.contains(&key), "missing {key}");
    }

    let uuid = body["uuid"].as_str().unwrap();
    let fetched = server.get("/get-user").add_query_param("uuid", uuid).await;
    fetched.assert_status_ok();
    assert_eq!(fetched.json::<Value>(), body);
}

#[tokio::test]
async fn test_unknown_user_is_404() {
    let server = test_server();

    let response = server.get("/get-user").add_query_param("uuid", "nobody").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert!(response.json::<Value>()["error"].as_str().unwrap().contains("nobody"));
}

// =============================================================================
// Write path
// =============================================================================

#[tokio::test]
async fn test_submit_without_session_creates_one() {
    let server = test_server();
    let asker = guest(&server).await;

    let session = submit(
        &server,
        json!({ "msg": "Is C++ faster than Rust?", "userId": asker.uuid, "isAnswer": false }),
    )
    .await;

    assert_eq!(session.title, "Is C++ faster than Rust?");
    assert_eq!(session.owner_user_id, asker.uuid);
    assert_eq!(session.content.len(), 1);
    assert_eq!(session.content[0].display_name, asker.display_name);
}

#[tokio::test]
async fn test_submit_appends_in_order() {
    let server = test_server();
    let asker = guest(&server).await;
    let helper = guest(&server).await;

    let first = submit(
        &server,
        json!({ "msg": "q", "userId": asker.uuid, "isAnswer": false }),
    )
    .await;
    let second = submit(
        &server,
        json!({ "msg": "a", "userId": helper.uuid, "isAnswer": true, "uuid": first.uuid }),
    )
    .await;

    assert_eq!(second.uuid, first.uuid);
    let contents: Vec<&str> = second.content.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["q", "a"]);
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
async fn test_submit_unknown_ids_are_404() {
    let server = test_server();
    let asker = guest(&server).await;

    let unknown_session = server
        .post("/submit")
        .json(&json!({ "msg": "hi", "userId": asker.uuid, "isAnswer": false, "uuid": "missing" }))
        .await;
    unknown_session.assert_status(StatusCode::NOT_FOUND);

    let unknown_user = server
        .post("/submit")
        .json(&json!({ "msg": "hi", "userId": "ghost", "isAnswer": false }))
        .await;
    unknown_user.assert_status(StatusCode::NOT_FOUND);

    // Neither failure left a session behind.
    let all = server.get("/all-sessions").await.json::<Vec<Session>>();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_rejected_first_message_leaves_no_session() {
    let server = test_server();
    let asker = guest(&server).await;

    let response = server
        .post("/submit")
        .json(&json!({ "msg": "   ", "userId": asker.uuid, "isAnswer": false }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let all = server.get("/all-sessions").await.json::<Vec<Session>>();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_submit_rejects_malformed_body() {
    let server = test_server();

    let response = server
        .post("/submit")
        .json(&json!({ "msg": "missing fields" }))
        .await;
    assert!(response.status_code().is_client_error());
}

// =============================================================================
// Read path
// =============================================================================

#[tokio::test]
async fn test_create_and_get_session_projections() {
    let server = test_server();
    let asker = guest(&server).await;

    let created = server
        .post("/create-session")
        .json(&json!({ "title": "Borrow checker woes", "userId": asker.uuid }))
        .await;
    created.assert_status_ok();
    let summary = created.json::<SessionSummary>();
    assert_eq!(summary.message_count, 0);

    submit(
        &server,
        json!({ "msg": "Why E0502?", "userId": asker.uuid, "isAnswer": false, "uuid": summary.uuid }),
    )
    .await;

    let meta = server
        .get("/get-session")
        .add_query_param("uuid", &summary.uuid)
        .await
        .json::<Value>();
    assert_eq!(meta["messageCount"], 1);
    assert!(meta.get("content").is_none());

    let full = server
        .get("/get-session")
        .add_query_param("uuid", &summary.uuid)
        .add_query_param("full", true)
        .await
        .json::<Session>();
    assert_eq!(full.content.len(), 1);

    server
        .get("/get-session")
        .add_query_param("uuid", "missing")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_session_requires_known_owner() {
    let server = test_server();

    let response = server
        .post("/create-session")
        .json(&json!({ "title": "orphan", "userId": "ghost" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unanswered_listing() {
    let server = test_server();
    let asker = guest(&server).await;
    let helper = guest(&server).await;

    let open = submit(
        &server,
        json!({ "msg": "open question", "userId": asker.uuid, "isAnswer": false }),
    )
    .await;
    let closed = submit(
        &server,
        json!({ "msg": "closed question", "userId": asker.uuid, "isAnswer": false }),
    )
    .await;
    submit(
        &server,
        json!({ "msg": "answer", "userId": helper.uuid, "isAnswer": true, "uuid": closed.uuid }),
    )
    .await;

    let for_helper = server
        .get("/all-unanswered-sessions")
        .add_query_param("answererId", &helper.uuid)
        .await
        .json::<Vec<SessionSummary>>();
    let ids: Vec<&str> = for_helper.iter().map(|s| s.uuid.as_str()).collect();
    assert_eq!(ids, vec![open.uuid.as_str()]);

    let for_asker = server
        .get("/all-unanswered-sessions")
        .add_query_param("answerer_id", &asker.uuid)
        .await
        .json::<Vec<SessionSummary>>();
    assert!(for_asker.is_empty());
}

#[tokio::test]
async fn test_unanswered_listing_respects_limit() {
    let server = test_server();
    let asker = guest(&server).await;
    let helper = guest(&server).await;

    for i in 0..4 {
        submit(
            &server,
            json!({ "msg": format!("question {i}"), "userId": asker.uuid, "isAnswer": false }),
        )
        .await;
    }

    let listed = server
        .get("/all-unanswered-sessions")
        .add_query_param("answererId", &helper.uuid)
        .add_query_param("limit", 2)
        .await
        .json::<Vec<SessionSummary>>();
    assert_eq!(listed.len(), 2);
    assert!(listed[0].updated_at >= listed[1].updated_at);
}

#[tokio::test]
async fn test_health() {
    let server = test_server();
    let body = server.get("/health").await.json::<Value>();
    assert_eq!(body, json!({ "status": "ok", "connections": 0 }));
}
