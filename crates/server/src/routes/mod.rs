//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Liveness
//! GET  /health/ready                        - Store backend reachable
//! GET  /ws                                  - WebSocket upgrade
//!
//! # Auth (rate limited)
//! POST /api/auth/register                   - Create account, returns token
//! POST /api/auth/login                      - Exchange credentials for token
//! GET  /api/auth/me                         - Current user
//!
//! # Users
//! GET    /api/users                         - List (admin)
//! GET    /api/users/{id}                    - Profile
//! PUT    /api/users/{id}                    - Update (self/admin)
//! PUT    /api/users/{id}/role               - Set role (admin)
//! DELETE /api/users/{id}                    - Delete (admin)
//!
//! # Catalog
//! GET|POST       /api/products
//! GET|PUT|DELETE /api/products/{id}
//! GET|POST       /api/products/{id}/reviews
//! GET            /api/products/{id}/rating
//! PUT|DELETE     /api/reviews/{id}
//!
//! # Support
//! GET|POST       /api/tickets
//! GET            /api/tickets/stats
//! GET|PUT|DELETE /api/tickets/{id}
//! GET|POST       /api/tickets/{id}/comments
//!
//! # Inventory
//! GET  /api/inventory
//! GET  /api/inventory/summary
//! GET  /api/inventory/{product_id}
//! PUT  /api/inventory/{product_id}
//! POST /api/inventory/{product_id}/adjust
//! GET  /api/inventory/{product_id}/history
//!
//! # Marketplace
//! GET|POST /api/orders
//! GET      /api/orders/{id}
//! PUT      /api/orders/{id}/status
//! POST     /api/orders/{id}/cancel
//! GET|PUT  /api/orders/{id}/shipping
//!
//! # Chat
//! GET|POST /api/chat/rooms
//! GET      /api/chat/rooms/{id}
//! GET|POST /api/chat/rooms/{id}/messages
//! POST     /api/chat/rooms/{id}/read
//!
//! # Notifications
//! GET    /api/notifications
//! GET    /api/notifications/unread-count
//! POST   /api/notifications/read-all
//! POST   /api/notifications/{id}/read
//! DELETE /api/notifications/{id}
//! ```

pub mod auth;
pub mod chat;
pub mod health;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod shipping;
pub mod tickets;
pub mod users;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
}

/// Create the user routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users::index))
        .route(
            "/{id}",
            get(users::show).put(users::update).delete(users::delete),
        )
        .route("/{id}/role", put(users::set_role))
}

/// Create the catalog routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::delete),
        )
        .route(
            "/{id}/reviews",
            get(reviews::index).post(reviews::create),
        )
        .route("/{id}/rating", get(reviews::rating))
}

/// Create the review routes router.
pub fn review_routes() -> Router<AppState> {
    Router::new().route("/{id}", put(reviews::update).delete(reviews::delete))
}

/// Create the ticket routes router.
pub fn ticket_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(tickets::index).post(tickets::create))
        .route("/stats", get(tickets::stats))
        .route(
            "/{id}",
            get(tickets::show)
                .put(tickets::update)
                .delete(tickets::delete),
        )
        .route(
            "/{id}/comments",
            get(tickets::comments).post(tickets::add_comment),
        )
}

/// Create the inventory routes router.
pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(inventory::index))
        .route("/summary", get(inventory::summary))
        .route(
            "/{product_id}",
            get(inventory::show).put(inventory::update),
        )
        .route("/{product_id}/adjust", post(inventory::adjust))
        .route("/{product_id}/history", get(inventory::history))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::create))
        .route("/{id}", get(orders::show))
        .route("/{id}/status", put(orders::set_status))
        .route("/{id}/cancel", post(orders::cancel))
        .route(
            "/{id}/shipping",
            get(shipping::show).put(shipping::update),
        )
}

/// Create the chat routes router.
pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(chat::rooms).post(chat::open_room))
        .route("/rooms/{id}", get(chat::show_room))
        .route(
            "/rooms/{id}/messages",
            get(chat::messages).post(chat::post_message),
        )
        .route("/rooms/{id}/read", post(chat::mark_read))
}

/// Create the notification routes router.
pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(notifications::index))
        .route("/unread-count", get(notifications::unread_count))
        .route("/read-all", post(notifications::read_all))
        .route("/{id}/read", post(notifications::mark_read))
        .route("/{id}", delete(notifications::delete))
}

/// Create all authenticated API routes (everything under `/api` except the
/// rate-limited auth routes).
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(auth::me))
        .nest("/users", user_routes())
        .nest("/products", product_routes())
        .nest("/reviews", review_routes())
        .nest("/tickets", ticket_routes())
        .nest("/inventory", inventory_routes())
        .nest("/orders", order_routes())
        .nest("/chat", chat_routes())
        .nest("/notifications", notification_routes())
}
