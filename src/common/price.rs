//! Exact decimal price and quantity types.
//!
//! `spec.md` §3 requires "exact decimal / fixed-point" arithmetic with "no
//! floating-point rounding in price comparisons or totals". The teacher's
//! `OrderBook` indexed price levels by a raw `u128` tick count (via
//! `pricelevel`); this crate keeps that integer-keyed `SkipMap` scheme
//! internally (see `engine::book`) but exposes [`Price`] and [`Quantity`]
//! as `rust_decimal::Decimal` newtypes at the public API boundary,
//! grounded in `usealtoal-edgelord`'s use of `rust_decimal` for order
//! prices and quantities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// An exact decimal price. `None` at the `Order` level represents a pure
/// market order with no limit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

/// An exact decimal quantity. Always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(Decimal);

impl Price {
    /// Construct a price from a `Decimal`.
    #[must_use]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Returns the underlying `Decimal`.
    #[must_use]
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Convert to an integer tick key for the engine's `SkipMap` index,
    /// given a `tick_size` (minimum price increment). The key is
    /// `round(price / tick_size)`; callers must validate `price` is an
    /// exact multiple of `tick_size` beforehand (`engine::book::OrderBook`'s
    /// order admission path rejects non-aligned prices before they ever
    /// reach this conversion).
    #[must_use]
    pub fn to_tick_key(self, tick_size: Decimal) -> u128 {
        let ticks = self.0 / tick_size;
        ticks.trunc().mantissa().unsigned_abs() as u128
    }
}

impl Quantity {
    /// Construct a quantity from a `Decimal`. Negative values are clamped
    /// to zero: quantities are never negative in this domain.
    #[must_use]
    pub fn new(value: Decimal) -> Self {
        Self(value.max(Decimal::ZERO))
    }

    /// The zero quantity.
    #[must_use]
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the underlying `Decimal`.
    #[must_use]
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Returns `true` if this quantity is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns the smaller of `self` and `other`.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 { self } else { other }
    }
}

impl Add for Quantity {
    type Output = Quantity;
    fn add(self, rhs: Self) -> Self::Output {
        Quantity::new(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Quantity;
    /// Saturating subtraction: a resting order's filled quantity never
    /// exceeds its total, so this never needs to go negative in correct
    /// usage, but we clamp defensively at the type boundary instead of
    /// panicking on misuse.
    fn sub(self, rhs: Self) -> Self::Output {
        Quantity::new(self.0 - rhs.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tick_key_rounds_down_to_tick_multiple() {
        let price = Price::new(dec!(100.50));
        assert_eq!(price.to_tick_key(dec!(0.01)), 10050);
    }

    #[test]
    fn quantity_sub_is_saturating() {
        let a = Quantity::new(dec!(3));
        let b = Quantity::new(dec!(5));
        assert_eq!((a - b).as_decimal(), Decimal::ZERO);
    }

    #[test]
    fn quantity_min_picks_smaller() {
        let a = Quantity::new(dec!(3));
        let b = Quantity::new(dec!(5));
        assert_eq!(a.min(b).as_decimal(), dec!(3));
    }
}
