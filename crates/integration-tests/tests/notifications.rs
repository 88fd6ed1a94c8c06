//! The notification inbox.

use axum::http::StatusCode;
use serde_json::json;

use tradepost_integration_tests::{Session, TestApp};

/// Three reviews on one of the seller's products, so the seller has three
/// unread notifications.
async fn seller_with_inbox(app: &TestApp) -> Session {
    let sam = app.register("sam", "seller").await;
    let product = app.create_product(&sam, "Hammer", "9.99", 5).await;
    for name in ["ann", "ben", "cat"] {
        let buyer = app.register(name, "customer").await;
        let res = app
            .post(
                &format!("/api/products/{product}/reviews"),
                Some(&buyer.token),
                json!({ "rating": 4, "comment": "Solid" }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
    }
    sam
}

#[tokio::test]
async fn test_mark_one_read_and_filter_unread() {
    let app = TestApp::new();
    let sam = seller_with_inbox(&app).await;

    let res = app.get("/api/notifications", Some(&sam.token)).await;
    assert_eq!(res.body["total"], json!(3));
    assert_eq!(res.body["items"][0]["kind"], json!("review_posted"));

    let id = res.body["items"][1]["id"].as_str().unwrap_or_default().to_string();
    let res = app
        .post(&format!("/api/notifications/{id}/read"), Some(&sam.token), json!({}))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["read"], json!(true));

    let res = app.get("/api/notifications?unread=true", Some(&sam.token)).await;
    assert_eq!(res.body["total"], json!(2));
    assert_eq!(app.unread_count(&sam).await, 2);
}

#[tokio::test]
async fn test_read_all_reports_how_many_changed() {
    let app = TestApp::new();
    let sam = seller_with_inbox(&app).await;

    let res = app
        .post("/api/notifications/read-all", Some(&sam.token), json!({}))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["count"], json!(3));
    assert_eq!(app.unread_count(&sam).await, 0);

    let res = app
        .post("/api/notifications/read-all", Some(&sam.token), json!({}))
        .await;
    assert_eq!(res.body["count"], json!(0));
}

#[tokio::test]
async fn test_other_users_notifications_are_not_found() {
    let app = TestApp::new();
    let sam = seller_with_inbox(&app).await;
    let eve = app.register("eve", "customer").await;

    let res = app.get("/api/notifications", Some(&sam.token)).await;
    let id = res.body["items"][0]["id"].as_str().unwrap_or_default().to_string();
    let uri = format!("/api/notifications/{id}");

    let res = app
        .post(&format!("{uri}/read"), Some(&eve.token), json!({}))
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    let res = app.delete(&uri, Some(&eve.token)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(app.unread_count(&sam).await, 3);

    let res = app.delete(&uri, Some(&sam.token)).await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    let res = app.delete(&uri, Some(&sam.token)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.get("/api/notifications", Some(&sam.token)).await;
    assert_eq!(res.body["total"], json!(2));
}
