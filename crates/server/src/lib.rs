//! Tradepost server library.
//!
//! One backend for four domains that share the same shape: a product
//! catalog with reviews, a support helpdesk, inventory tracking, and a
//! buyer/seller marketplace with chat. Exposed as a library so the
//! integration tests can drive the router in-process.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use std::time::Duration;

use axum::http::{HeaderValue, Request, Response};
use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::{auth_rate_limiter, rate_limited_response, request_id_middleware};
use crate::state::AppState;

/// CORS policy from `CORS_ALLOWED_ORIGINS`; any origin when unset.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let mut auth = routes::auth_routes();
    if state.config().auth_rate_limit {
        auth = auth
            .layer(auth_rate_limiter())
            .layer(axum::middleware::map_response(rate_limited_response));
    }

    let api = Router::new().nest("/auth", auth).merge(routes::api_routes());
    let cors = cors_layer(&state.config().cors_allowed_origins);

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/health/ready", get(routes::health::ready))
        .route("/ws", get(realtime::socket::upgrade))
        .nest("/api", api)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        user_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(|response: &Response<_>, latency: Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    span.record(
                        "latency_ms",
                        u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    );
                    DefaultOnResponse::default().on_response(response, latency, span);
                }),
        )
        .layer(cors)
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
