//! Business services shared by routes, the socket loop, and the CLI.

pub mod auth;
pub mod chat;
pub mod notifier;
pub mod stock;
pub mod token;
