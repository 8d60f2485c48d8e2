use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use spark_api::{AppStateInner, router};
use spark_chat::backend::LocalBackend;
use spark_db::Database;
use spark_gateway::dispatcher::Dispatcher;
use spark_gateway::tokens::issue_token;
use spark_types::models::UserId;

const SECRET: &str = "route-test-secret";

fn app() -> Router {
    let backend = LocalBackend::new(
        Arc::new(Database::open_in_memory().unwrap()),
        Dispatcher::new(),
    );
    router(AppStateInner::new(backend, SECRET.into(), 20, 50))
}

fn token(user: &str) -> String {
    issue_token(SECRET, &UserId::from(user), chrono::Duration::hours(1)).unwrap()
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    user: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(app: &Router, uri: &str, user: &str) -> (StatusCode, Value) {
    call(app, "GET", uri, user, None).await
}

async fn post(app: &Router, uri: &str, user: &str, body: Value) -> (StatusCode, Value) {
    call(app, "POST", uri, user, Some(body)).await
}

async fn delete(app: &Router, uri: &str, user: &str) -> (StatusCode, Value) {
    call(app, "DELETE", uri, user, None).await
}

/// Like both ways and return the conversation id.
async fn match_users(app: &Router, a: &str, b: &str) -> String {
    post(app, "/likes", a, json!({ "liked_id": b })).await;
    let (status, outcome) = post(app, "/likes", b, json!({ "liked_id": a })).await;
    assert_eq!(status, StatusCode::OK);
    outcome["conversation"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let app = app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/inbox").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/inbox")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn like_flow_reports_match_state() {
    let app = app();

    let (status, first) = post(&app, "/likes", "alice", json!({ "liked_id": "bob" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["matched"], false);

    let (_, second) = post(&app, "/likes", "bob", json!({ "liked_id": "alice" })).await;
    assert_eq!(second["matched"], true);
    assert_eq!(second["already_existed"], false);

    let (_, third) = post(&app, "/likes", "bob", json!({ "liked_id": "alice" })).await;
    assert_eq!(third["already_existed"], true);

    let (status, _) = post(&app, "/likes", "bob", json!({ "liked_id": "bob" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, matches) = get(&app, "/matches", "alice").await;
    assert_eq!(matches.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn only_the_recipient_can_pass_a_like() {
    let app = app();
    post(&app, "/likes", "alice", json!({ "liked_id": "bob" })).await;

    let (_, incoming) = get(&app, "/likes/incoming", "bob").await;
    let like_id = incoming[0]["id"].as_str().unwrap().to_string();

    let (status, _) = delete(&app, &format!("/likes/{like_id}"), "alice").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = delete(&app, &format!("/likes/{like_id}"), "bob").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, incoming) = get(&app, "/likes/incoming", "bob").await;
    assert!(incoming.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn send_and_page_messages() {
    let app = app();
    let conversation = match_users(&app, "alice", "bob").await;
    let uri = format!("/matches/{conversation}/messages");

    for i in 0..3 {
        let body = json!({ "content": format!(" m{i} ") });
        let (status, message) = post(&app, &uri, "alice", body).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(message["content"], format!("m{i}"));
    }

    let (status, page) = get(&app, &format!("{uri}?page=0&page_size=2"), "bob").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["messages"].as_array().unwrap().len(), 2);
    assert_eq!(page["has_more"], true);

    let (_, page) = get(&app, &format!("{uri}?page=1&page_size=2"), "bob").await;
    assert_eq!(page["messages"][0]["content"], "m2");
    assert_eq!(page["has_more"], false);
}

#[tokio::test]
async fn message_errors_map_to_statuses() {
    let app = app();
    let conversation = match_users(&app, "alice", "bob").await;
    let uri = format!("/matches/{conversation}/messages");

    let (status, body) = post(&app, &uri, "alice", json!({ "content": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = post(&app, &uri, "mallory", json!({ "content": "hi" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let missing = "/matches/missing/messages";
    let (status, _) = post(&app, missing, "alice", json!({ "content": "hi" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, &uri, "mallory").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, &format!("{uri}?page_size=0"), "alice").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inbox_marks_conversations_unread() {
    let app = app();
    let with_bob = match_users(&app, "alice", "bob").await;
    let with_carol = match_users(&app, "alice", "carol").await;

    post(&app, &format!("/matches/{with_bob}/messages"), "bob", json!({ "content": "hey" })).await;

    let (status, inbox) = get(&app, "/inbox", "alice").await;
    assert_eq!(status, StatusCode::OK);
    let inbox = inbox.as_array().unwrap();
    assert_eq!(inbox.len(), 2);
    assert_eq!(inbox[0]["conversation_id"], with_bob.as_str());
    assert_eq!(inbox[0]["is_unread"], true);
    assert_eq!(inbox[1]["conversation_id"], with_carol.as_str());
    assert_eq!(inbox[1]["last_message"], Value::Null);

    let (_, unread) = get(&app, "/inbox/unread", "alice").await;
    assert_eq!(unread["unread"], 1);
    let (_, unread) = get(&app, "/inbox/unread", "bob").await;
    assert_eq!(unread["unread"], 0);
}
