//! Support tickets: visibility, workflow permissions, and notifications.

use axum::http::StatusCode;
use serde_json::json;

use tradepost_core::UserRole;
use tradepost_integration_tests::{Session, TestApp};

async fn open_ticket(app: &TestApp, requester: &Session) -> String {
    let res = app
        .post(
            "/api/tickets",
            Some(&requester.token),
            json!({
                "subject": "Package never arrived",
                "description": "Ordered two weeks ago.",
                "priority": "high",
                "category": "shipping",
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.body);
    assert_eq!(res.str("status"), "open");
    res.str("id").to_string()
}

#[tokio::test]
async fn test_tickets_are_private_to_requester_and_staff() {
    let app = TestApp::new();
    let agent = app.create_user("agent", UserRole::Agent).await;
    let ann = app.register("ann", "customer").await;
    let ben = app.register("ben", "customer").await;
    let id = open_ticket(&app, &ann).await;

    // Staff hear about new tickets.
    assert_eq!(app.unread_count(&agent).await, 1);

    let res = app.get(&format!("/api/tickets/{id}"), Some(&ben.token)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.get("/api/tickets", Some(&ben.token)).await;
    assert_eq!(res.body["total"], json!(0));

    let res = app.get("/api/tickets", Some(&agent.token)).await;
    assert_eq!(res.body["total"], json!(1));
    assert_eq!(res.body["items"][0]["requester_name"], json!("ann"));
}

#[tokio::test]
async fn test_only_staff_drive_the_workflow() {
    let app = TestApp::new();
    let agent = app.create_user("agent", UserRole::Agent).await;
    let ann = app.register("ann", "customer").await;
    let id = open_ticket(&app, &ann).await;
    let uri = format!("/api/tickets/{id}");

    let res = app
        .put(&uri, Some(&ann.token), json!({ "status": "resolved" }))
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    // Requesters may still edit the details.
    let res = app
        .put(&uri, Some(&ann.token), json!({ "subject": "Package lost" }))
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let res = app
        .put(&uri, Some(&agent.token), json!({ "assignee_id": ann.id }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .put(
            &uri,
            Some(&agent.token),
            json!({ "assignee_id": agent.id, "status": "in_progress" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
    assert_eq!(res.str("status"), "in_progress");
    assert_eq!(res.body["assignee_name"], json!("agent"));
    assert_eq!(app.unread_count(&ann).await, 1);
}

#[tokio::test]
async fn test_resolve_then_close_freezes_ticket() {
    let app = TestApp::new();
    let agent = app.create_user("agent", UserRole::Agent).await;
    let ann = app.register("ann", "customer").await;
    let id = open_ticket(&app, &ann).await;
    let uri = format!("/api/tickets/{id}");

    let res = app
        .put(&uri, Some(&agent.token), json!({ "status": "resolved" }))
        .await;
    assert!(res.body["resolved_at"].is_string());

    let res = app
        .put(&uri, Some(&agent.token), json!({ "status": "in_progress" }))
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let res = app
        .put(&uri, Some(&agent.token), json!({ "status": "closed" }))
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let res = app
        .put(&uri, Some(&agent.token), json!({ "priority": "low" }))
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let res = app
        .post(
            &format!("{uri}/comments"),
            Some(&ann.token),
            json!({ "body": "Any news?" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_comments_notify_the_other_side() {
    let app = TestApp::new();
    let agent = app.create_user("agent", UserRole::Agent).await;
    let ann = app.register("ann", "customer").await;
    let id = open_ticket(&app, &ann).await;
    let uri = format!("/api/tickets/{id}");

    app.put(&uri, Some(&agent.token), json!({ "assignee_id": agent.id }))
        .await;
    let agent_before = app.unread_count(&agent).await;
    let ann_before = app.unread_count(&ann).await;

    let res = app
        .post(
            &format!("{uri}/comments"),
            Some(&ann.token),
            json!({ "body": "Any news?" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(app.unread_count(&agent).await, agent_before + 1);
    assert_eq!(app.unread_count(&ann).await, ann_before);

    app.post(
        &format!("{uri}/comments"),
        Some(&agent.token),
        json!({ "body": "Checking with the carrier." }),
    )
    .await;
    assert_eq!(app.unread_count(&ann).await, ann_before + 1);

    let res = app.get(&format!("{uri}/comments"), Some(&ann.token)).await;
    assert_eq!(res.body["total"], json!(2));
    assert_eq!(res.body["items"][0]["body"], json!("Any news?"));
}

#[tokio::test]
async fn test_stats_are_staff_only() {
    let app = TestApp::new();
    let admin = app.create_user("admin", UserRole::Admin).await;
    let ann = app.register("ann", "customer").await;
    open_ticket(&app, &ann).await;

    let res = app.get("/api/tickets/stats", Some(&ann.token)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.get("/api/tickets/stats", Some(&admin.token)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["total"], json!(1));
    assert_eq!(res.body["by_status"]["open"], json!(1));
    assert_eq!(res.body["open_unassigned"], json!(1));
}
