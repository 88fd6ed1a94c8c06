//! Stock records and their adjustment history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradepost_core::{
    AdjustmentId, AdjustmentReason, OrderId, ProductId, StockLevel, StockStatus, UserId,
};

/// Stock held for one product. Keyed by the product id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub product_id: ProductId,
    /// Owner of the product, denormalized for listing.
    pub seller_id: UserId,
    pub quantity: u32,
    pub critical_level: u32,
    pub max_level: Option<u32>,
    pub location: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    #[must_use]
    pub const fn level(&self) -> StockLevel {
        StockLevel::new(self.quantity, self.critical_level, self.max_level)
    }

    #[must_use]
    pub fn status(&self) -> StockStatus {
        self.level().status()
    }
}

/// One change to a product's quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub id: AdjustmentId,
    pub product_id: ProductId,
    /// Who made the change; the buyer for sales and returns.
    pub actor_id: UserId,
    pub delta: i64,
    pub reason: AdjustmentReason,
    pub note: Option<String>,
    /// Quantity after the change was applied.
    pub resulting_quantity: u32,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}
