//! Marketplace orders and shipments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradepost_core::{
    ChatRoomId, Money, OrderId, OrderStatus, ProductId, ShipmentId, ShippingStatus, UserId,
};

/// A purchase from a single seller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub note: Option<String>,
    /// Buyer/seller conversation opened with the order.
    pub chat_room_id: ChatRoomId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.buyer_id == user || self.seller_id == user
    }
}

/// One line of an order, with the price at the time of purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
}

/// Delivery tracking for an order. One per order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub status: ShippingStatus,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub address: String,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
