//! Tradepost Core - Shared domain types.
//!
//! This crate provides the types used across all Tradepost components:
//! - `server` - HTTP + WebSocket backend for the catalog, helpdesk,
//!   inventory, and marketplace domains
//! - `cli` - Command-line tools for migrations and user management
//!
//! # Architecture
//!
//! The core crate contains only types and pure business rules - no I/O, no
//! database access, no HTTP. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, emails, usernames, statuses, ratings,
//!   stock levels, and money

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

#[doc(hidden)]
pub use uuid as __uuid;
