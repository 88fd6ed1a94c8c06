//! HTTP middleware and extractors.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS
//! 5. Rate limiting on the auth routes (governor)

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::{RequireAdmin, RequireAuth, RequireStaff, authenticate, bearer_token};
pub use rate_limit::{auth_rate_limiter, rate_limited_response};
pub use request_id::{RequestId, request_id_middleware};
