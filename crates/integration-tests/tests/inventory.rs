//! Stock records, manual adjustments, and low-stock alerts.

use axum::http::StatusCode;
use serde_json::json;

use tradepost_core::UserRole;
use tradepost_integration_tests::TestApp;

#[tokio::test]
async fn test_adjustment_into_low_stock_alerts_owner_and_admins() {
    let app = TestApp::new();
    let admin = app.create_user("admin", UserRole::Admin).await;
    let seller = app.register("sam", "seller").await;
    let product = app.create_product(&seller, "Hammer", "9.99", 10).await;
    let uri = format!("/api/inventory/{product}/adjust");

    let res = app
        .post(
            &uri,
            Some(&seller.token),
            json!({ "delta": -7, "reason": "damage", "note": "Water leak" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
    assert_eq!(res.body["item"]["quantity"], json!(3));
    assert_eq!(res.body["item"]["status"], json!("low"));
    assert_eq!(res.body["adjustment"]["resulting_quantity"], json!(3));
    assert_eq!(app.unread_count(&seller).await, 1);
    assert_eq!(app.unread_count(&admin).await, 1);

    // Staying low is not news; getting worse is.
    app.post(&uri, Some(&seller.token), json!({ "delta": 1, "reason": "return" }))
        .await;
    assert_eq!(app.unread_count(&seller).await, 1);
    app.post(&uri, Some(&seller.token), json!({ "delta": -4, "reason": "damage" }))
        .await;
    assert_eq!(app.unread_count(&seller).await, 2);

    let res = app
        .get("/api/notifications?unread=true", Some(&seller.token))
        .await;
    assert_eq!(res.body["items"][0]["kind"], json!("low_stock"));
    assert_eq!(res.body["items"][0]["title"], json!("Hammer is out of stock"));
}

#[tokio::test]
async fn test_invalid_adjustments_are_rejected() {
    let app = TestApp::new();
    let seller = app.register("sam", "seller").await;
    let product = app.create_product(&seller, "Hammer", "9.99", 5).await;
    let uri = format!("/api/inventory/{product}/adjust");

    let res = app
        .post(&uri, Some(&seller.token), json!({ "delta": 0, "reason": "correction" }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .post(&uri, Some(&seller.token), json!({ "delta": -6, "reason": "damage" }))
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let res = app
        .post(&uri, Some(&seller.token), json!({ "delta": i64::MAX, "reason": "restock" }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .get(&format!("/api/inventory/{product}"), Some(&seller.token))
        .await;
    assert_eq!(res.body["quantity"], json!(5));
}

#[tokio::test]
async fn test_inventory_access_by_role() {
    let app = TestApp::new();
    let agent = app.create_user("agent", UserRole::Agent).await;
    let seller = app.register("sam", "seller").await;
    let other = app.register("sue", "seller").await;
    let buyer = app.register("bob", "customer").await;
    let product = app.create_product(&seller, "Hammer", "9.99", 5).await;
    app.create_product(&other, "Saw", "19.99", 50).await;
    let uri = format!("/api/inventory/{product}");

    let res = app.get("/api/inventory", Some(&buyer.token)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.get("/api/inventory", Some(&seller.token)).await;
    assert_eq!(res.body["total"], json!(1));

    let res = app.get("/api/inventory", Some(&agent.token)).await;
    assert_eq!(res.body["total"], json!(2));

    let res = app.get(&uri, Some(&other.token)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    // Agents can look but not touch.
    let res = app.get(&uri, Some(&agent.token)).await;
    assert_eq!(res.status, StatusCode::OK);
    let res = app
        .post(
            &format!("{uri}/adjust"),
            Some(&agent.token),
            json!({ "delta": 5, "reason": "restock" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_thresholds_and_summary() {
    let app = TestApp::new();
    let seller = app.register("sam", "seller").await;
    let hammer = app.create_product(&seller, "Hammer", "9.99", 30).await;
    app.create_product(&seller, "Saw", "19.99", 1).await;
    let uri = format!("/api/inventory/{hammer}");

    let res = app
        .put(&uri, Some(&seller.token), json!({ "critical_level": 10, "max_level": 5 }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .put(
            &uri,
            Some(&seller.token),
            json!({ "max_level": 20, "location": "Aisle 4" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
    assert_eq!(res.str("status"), "overstock");
    assert_eq!(res.str("location"), "Aisle 4");

    let res = app.get("/api/inventory/summary", Some(&seller.token)).await;
    assert_eq!(res.body["total"], json!(2));
    assert_eq!(res.body["by_status"]["overstock"], json!(1));
    assert_eq!(res.body["by_status"]["critical"], json!(1));
    assert_eq!(res.body["by_status"]["normal"], json!(0));
    assert_eq!(res.body["needs_attention"], json!(1));

    let res = app
        .get("/api/inventory?status=critical", Some(&seller.token))
        .await;
    assert_eq!(res.body["total"], json!(1));
    assert_eq!(res.body["items"][0]["product_name"], json!("Saw"));
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let app = TestApp::new();
    let seller = app.register("sam", "seller").await;
    let product = app.create_product(&seller, "Hammer", "9.99", 10).await;

    app.post(
        &format!("/api/inventory/{product}/adjust"),
        Some(&seller.token),
        json!({ "delta": 5, "reason": "restock" }),
    )
    .await;

    let res = app
        .get(&format!("/api/inventory/{product}/history"), Some(&seller.token))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["total"], json!(2));
    assert_eq!(res.body["items"][0]["delta"], json!(5));
    assert_eq!(res.body["items"][0]["resulting_quantity"], json!(15));
    assert_eq!(res.body["items"][0]["actor_name"], json!("sam"));
}
