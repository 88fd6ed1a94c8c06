//! Account management by users and admins.

use axum::http::StatusCode;
use serde_json::json;

use tradepost_core::UserRole;
use tradepost_integration_tests::TestApp;

#[tokio::test]
async fn test_profiles_hide_email_from_others() {
    let app = TestApp::new();
    let ann = app.register("ann", "customer").await;
    let ben = app.register("ben", "customer").await;
    let uri = format!("/api/users/{}", ann.id);

    let res = app.get(&uri, Some(&ben.token)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.get("email").is_none());

    let res = app.get(&uri, Some(&ann.token)).await;
    assert_eq!(res.str("email"), "ann@example.com");
}

#[tokio::test]
async fn test_users_edit_only_themselves() {
    let app = TestApp::new();
    let ann = app.register("ann", "customer").await;
    let ben = app.register("ben", "customer").await;
    let uri = format!("/api/users/{}", ann.id);

    let res = app
        .put(&uri, Some(&ben.token), json!({ "display_name": "Not Ann" }))
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app
        .put(&uri, Some(&ann.token), json!({ "email": "ben@example.com" }))
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let res = app
        .put(
            &uri,
            Some(&ann.token),
            json!({ "display_name": "Ann Lee", "email": "Ann.Lee@Example.com" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
    assert_eq!(res.str("display_name"), "Ann Lee");
    assert_eq!(res.str("email"), "ann.lee@example.com");
}

#[tokio::test]
async fn test_admin_manages_roles_and_accounts() {
    let app = TestApp::new();
    let admin = app.create_user("admin", UserRole::Admin).await;
    let ann = app.register("ann", "customer").await;

    let res = app.get("/api/users", Some(&ann.token)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.get("/api/users?role=customer", Some(&admin.token)).await;
    assert_eq!(res.body["total"], json!(1));

    let res = app
        .put(
            &format!("/api/users/{}/role", admin.id),
            Some(&admin.token),
            json!({ "role": "customer" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    // Role changes apply to tokens already issued.
    let res = app.get("/api/tickets/stats", Some(&ann.token)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    let res = app
        .put(
            &format!("/api/users/{}/role", ann.id),
            Some(&admin.token),
            json!({ "role": "agent" }),
        )
        .await;
    assert_eq!(res.str("role"), "agent");
    let res = app.get("/api/tickets/stats", Some(&ann.token)).await;
    assert_eq!(res.status, StatusCode::OK);

    let res = app
        .delete(&format!("/api/users/{}", admin.id), Some(&admin.token))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .delete(&format!("/api/users/{}", ann.id), Some(&admin.token))
        .await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    let res = app.get("/api/auth/me", Some(&ann.token)).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}
