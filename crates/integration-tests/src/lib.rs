//! Integration test harness for Tradepost.
//!
//! Tests drive the full router in-process with `tower::ServiceExt::oneshot`
//! against an in-memory store, so no database or network is needed.
//!
//! ```rust,ignore
//! let app = TestApp::new();
//! let alice = app.register("alice", "customer").await;
//! let res = app.get("/api/auth/me", Some(&alice.token)).await;
//! assert_eq!(res.status, StatusCode::OK);
//! ```

#![allow(clippy::expect_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

use tradepost_core::{UserId, UserRole};
use tradepost_server::config::ServerConfig;
use tradepost_server::services::auth::NewUser;
use tradepost_server::state::AppState;
use tradepost_server::store::Store;

/// Password used for every account created by the harness.
pub const PASSWORD: &str = "correct-horse-battery";

const SECRET: &str = "integration-test-signing-key-Zq8#vN2!pL5@";

/// A signed-in user.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: UserId,
    pub token: String,
}

/// Status and decoded body of a response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    /// JSON body, or a JSON string for non-JSON bodies, or `null` if empty.
    pub body: Value,
}

impl TestResponse {
    /// A string field of the body.
    #[must_use]
    pub fn str(&self, key: &str) -> &str {
        self.body[key].as_str().unwrap_or_default()
    }
}

/// The application wired to an in-memory store, rate limiting off.
pub struct TestApp {
    pub state: AppState,
    router: Router,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        let mut config = ServerConfig::new(SecretString::from(SECRET));
        config.auth_rate_limit = false;
        let state = AppState::new(config, Store::memory());
        let router = tradepost_server::app(state.clone());
        Self { state, router }
    }

    /// Send a request and decode the response.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Register through the API (customer or seller).
    pub async fn register(&self, username: &str, role: &str) -> Session {
        let res = self
            .post(
                "/api/auth/register",
                None,
                json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                    "role": role,
                }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "register {username}: {:?}", res.body);
        session_from(&res.body)
    }

    /// Create an account with any role directly, as `tp-cli user create` does.
    pub async fn create_user(&self, username: &str, role: UserRole) -> Session {
        let email = format!("{username}@example.com");
        let user = self
            .state
            .auth()
            .create_user(NewUser {
                username,
                email: &email,
                password: PASSWORD,
                display_name: None,
                role,
            })
            .await
            .expect("user is created");
        let token = self
            .state
            .tokens()
            .issue(user.id, user.role)
            .expect("token is issued");
        Session { id: user.id, token }
    }

    /// List a product with the given stock; returns its id.
    pub async fn create_product(&self, seller: &Session, name: &str, price: &str, stock: u32) -> String {
        let res = self
            .post(
                "/api/products",
                Some(&seller.token),
                json!({
                    "name": name,
                    "category": "tools",
                    "price": price,
                    "initial_stock": stock,
                    "critical_level": 2,
                }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "create product: {:?}", res.body);
        res.str("id").to_string()
    }

    /// Unread notification count for a user.
    pub async fn unread_count(&self, session: &Session) -> u64 {
        let res = self
            .get("/api/notifications/unread-count", Some(&session.token))
            .await;
        res.body["count"].as_u64().expect("count is a number")
    }
}

fn session_from(body: &Value) -> Session {
    let id = serde_json::from_value(body["user"]["id"].clone()).expect("user id");
    let token = body["token"].as_str().expect("token").to_string();
    Session { id, token }
}
