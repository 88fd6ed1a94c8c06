//! Core types for Tradepost.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod rating;
pub mod status;
pub mod stock;
pub mod username;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Money, MoneyError};
pub use rating::{Rating, RatingError, RatingSummary};
pub use status::*;
pub use stock::{StockError, StockLevel, StockStatus};
pub use username::{Username, UsernameError};
