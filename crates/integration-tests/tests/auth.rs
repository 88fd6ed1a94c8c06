//! Registration, login, tokens, and the public endpoints.

use axum::http::StatusCode;
use serde_json::json;

use tradepost_integration_tests::{PASSWORD, TestApp};

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();

    let res = app.get("/health", None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!("ok"));

    let res = app.get("/health/ready", None).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = TestApp::new();
    let alice = app.register("alice", "customer").await;

    let res = app.get("/api/auth/me", Some(&alice.token)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.str("username"), "alice");
    assert_eq!(res.str("email"), "alice@example.com");

    let res = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "ALICE@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(!res.str("token").is_empty());
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let app = TestApp::new();
    app.register("bob", "customer").await;

    let res = app
        .post(
            "/api/auth/login",
            None,
            json!({ "username": "bob", "password": "not-the-password" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.str("error"), "Invalid credentials");
}

#[tokio::test]
async fn test_duplicate_username_conflicts() {
    let app = TestApp::new();
    app.register("carol", "customer").await;

    let res = app
        .post(
            "/api/auth/register",
            None,
            json!({
                "username": "Carol",
                "email": "other@example.com",
                "password": PASSWORD,
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_staff_roles_cannot_self_register() {
    let app = TestApp::new();
    let res = app
        .post(
            "/api/auth/register",
            None,
            json!({
                "username": "mallory",
                "email": "mallory@example.com",
                "password": PASSWORD,
                "role": "admin",
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_routes_need_a_valid_token() {
    let app = TestApp::new();

    let res = app.get("/api/auth/me", None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app.get("/api/auth/me", Some("not.a-token")).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert!(res.body.get("error").is_some());
}

#[tokio::test]
async fn test_websocket_requires_token_before_upgrade() {
    let app = TestApp::new();

    let res = app.get("/ws", None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app.get("/ws?token=garbage", None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    // A valid token without a handshake is a bad request, not a 401.
    let dave = app.register("dave", "customer").await;
    let res = app.get(&format!("/ws?token={}", dave.token), None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

