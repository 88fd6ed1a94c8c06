//! Monetary amounts using decimal arithmetic.

use std::iter::Sum;
use std::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount cannot be negative")]
    Negative,
    #[error("amount overflow")]
    Overflow,
}

/// A non-negative amount in the store currency, kept to two decimal places.
///
/// Serialized as a string (`"19.99"`) so clients never see float rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal, rounding to cents.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` for amounts below zero.
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        let mut cents = amount.round_dp(2);
        cents.rescale(2);
        Ok(Self(cents))
    }

    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Line total for `quantity` units.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the product does not fit a `Decimal`.
    pub fn times(self, quantity: u32) -> Result<Self, MoneyError> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
