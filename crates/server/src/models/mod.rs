//! Domain records held by the store.
//!
//! These are the stored shapes. Handlers build response views from them
//! where a record carries data the caller must not see (password hashes)
//! or needs derived fields (stock status, rating summaries).

mod chat;
mod inventory;
mod notification;
mod order;
mod product;
mod ticket;
mod user;

pub use chat::{ChatRoom, Message};
pub use inventory::{InventoryItem, StockAdjustment};
pub use notification::Notification;
pub use order::{Order, OrderItem, Shipment};
pub use product::{Product, Review};
pub use ticket::{Ticket, TicketComment};
pub use user::{User, UserView};
