//! Realtime push over WebSockets.
//!
//! - [`hub`] - registry of open sockets per user and fire-and-forget delivery
//! - [`protocol`] - JSON frames exchanged with clients
//! - [`socket`] - the `/ws` upgrade handler and per-connection loop

pub mod hub;
pub mod protocol;
pub mod socket;

pub use hub::Hub;
pub use protocol::{ClientCommand, ServerEvent};
