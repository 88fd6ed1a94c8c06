//! Catalog products and their reviews.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradepost_core::{Money, ProductId, Rating, ReviewId, UserId};

/// A product listed by a seller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Money,
    /// Stock keeping unit, unique across the catalog when present.
    pub sku: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Case-insensitive substring match on name and description.
    ///
    /// `needle` must already be lowercased.
    #[must_use]
    pub fn matches_query(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
    }
}

/// A user's rating of a product. At most one per (user, product).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub rating: Rating,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
