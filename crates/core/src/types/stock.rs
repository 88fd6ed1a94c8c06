//! Stock levels and the status derived from them.

use serde::{Deserialize, Serialize};

/// Errors applying a stock adjustment.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockError {
    #[error("adjustment must change the quantity")]
    ZeroDelta,
    #[error("insufficient stock: {available} available, {requested} requested")]
    Insufficient { available: u32, requested: u64 },
    #[error("stock quantity overflow")]
    Overflow,
}

/// Display classification of a stock level, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    Critical,
    Low,
    Normal,
    Overstock,
}

impl StockStatus {
    pub const ALL: &'static [Self] = &[
        Self::OutOfStock,
        Self::Critical,
        Self::Low,
        Self::Normal,
        Self::Overstock,
    ];

    /// Whether the owner should be told to restock.
    #[must_use]
    pub const fn needs_attention(self) -> bool {
        matches!(self, Self::OutOfStock | Self::Critical | Self::Low)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OutOfStock => "out_of_stock",
            Self::Critical => "critical",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::Overstock => "overstock",
        }
    }
}

impl std::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current stock of a product with its thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub quantity: u32,
    pub critical_level: u32,
    pub max_level: Option<u32>,
}

impl StockLevel {
    pub const DEFAULT_CRITICAL_LEVEL: u32 = 5;

    #[must_use]
    pub const fn new(quantity: u32, critical_level: u32, max_level: Option<u32>) -> Self {
        Self {
            quantity,
            critical_level,
            max_level,
        }
    }

    /// Classify the current quantity.
    ///
    /// - 0 is out of stock
    /// - at or below the critical level is critical
    /// - at or below twice the critical level is low
    /// - above the max level (when set) is overstock
    ///
    /// ```
    /// use tradepost_core::{StockLevel, StockStatus};
    ///
    /// assert_eq!(StockLevel::new(0, 5, None).status(), StockStatus::OutOfStock);
    /// assert_eq!(StockLevel::new(5, 5, None).status(), StockStatus::Critical);
    /// assert_eq!(StockLevel::new(10, 5, None).status(), StockStatus::Low);
    /// assert_eq!(StockLevel::new(11, 5, Some(100)).status(), StockStatus::Normal);
    /// assert_eq!(StockLevel::new(101, 5, Some(100)).status(), StockStatus::Overstock);
    /// ```
    #[must_use]
    pub fn status(&self) -> StockStatus {
        let low_level = self.critical_level.saturating_mul(2);
        if self.quantity == 0 {
            StockStatus::OutOfStock
        } else if self.quantity <= self.critical_level {
            StockStatus::Critical
        } else if self.quantity <= low_level {
            StockStatus::Low
        } else if self.max_level.is_some_and(|max| self.quantity > max) {
            StockStatus::Overstock
        } else {
            StockStatus::Normal
        }
    }

    /// Quantity after applying `delta`, without mutating.
    ///
    /// # Errors
    ///
    /// Returns `StockError::ZeroDelta` for a zero delta,
    /// `StockError::Insufficient` if the result would be negative, and
    /// `StockError::Overflow` if it would not fit.
    pub fn apply(&self, delta: i64) -> Result<u32, StockError> {
        if delta == 0 {
            return Err(StockError::ZeroDelta);
        }
        let next = i64::from(self.quantity)
            .checked_add(delta)
            .ok_or(StockError::Overflow)?;
        if next < 0 {
            return Err(StockError::Insufficient {
                available: self.quantity,
                requested: delta.unsigned_abs(),
            });
        }
        u32::try_from(next).map_err(|_| StockError::Overflow)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_critical_level() {
        // With no critical threshold only an empty shelf needs attention.
        assert_eq!(StockLevel::new(0, 0, None).status(), StockStatus::OutOfStock);
        assert_eq!(StockLevel::new(1, 0, None).status(), StockStatus::Normal);
    }

    #[test]
    fn test_low_band_boundaries() {
        let at = |q| StockLevel::new(q, 3, None).status();
        assert_eq!(at(3), StockStatus::Critical);
        assert_eq!(at(4), StockStatus::Low);
        assert_eq!(at(6), StockStatus::Low);
        assert_eq!(at(7), StockStatus::Normal);
    }

    #[test]
    fn test_shortage_wins_over_overstock() {
        // A misconfigured max below the critical level still reports shortage.
        assert_eq!(StockLevel::new(2, 5, Some(1)).status(), StockStatus::Critical);
    }

    #[test]
    fn test_needs_attention() {
        assert!(StockStatus::OutOfStock.needs_attention());
        assert!(StockStatus::Low.needs_attention());
        assert!(!StockStatus::Normal.needs_attention());
        assert!(!StockStatus::Overstock.needs_attention());
    }

    #[test]
    fn test_apply() {
        let level = StockLevel::new(10, 2, None);
        assert_eq!(level.apply(5).unwrap(), 15);
        assert_eq!(level.apply(-10).unwrap(), 0);
        assert_eq!(
            level.apply(-11),
            Err(StockError::Insufficient {
                available: 10,
                requested: 11
            })
        );
        assert_eq!(level.apply(0), Err(StockError::ZeroDelta));
        assert_eq!(level.apply(i64::from(u32::MAX)), Err(StockError::Overflow));
    }

    #[test]
    fn test_apply_extreme_deltas() {
        let level = StockLevel::new(10, 2, None);
        assert_eq!(level.apply(i64::MAX), Err(StockError::Overflow));
        assert_eq!(
            level.apply(i64::MIN),
            Err(StockError::Insufficient {
                available: 10,
                requested: i64::MIN.unsigned_abs(),
            })
        );
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StockStatus::OutOfStock).unwrap(),
            "\"out_of_stock\""
        );
    }
}
