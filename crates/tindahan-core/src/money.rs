//! # Money Module
//!
//! Provides the `Money` type for monetary values in centavos.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                  │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Centavos                                         │
//! │    ₱10.00 → 1000                                                        │
//! │    Every amount on the wire and in storage is a whole number of        │
//! │    centavos. A fractional or negative amount is rejected at the edge.  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Arithmetic that can be driven by device input is checked: an overflow
//! surfaces as a [`ValidationError`] instead of wrapping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use ts_rs::TS;

use crate::error::ValidationError;

/// Basis points in one whole (100%).
pub const BPS_SCALE: i64 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (centavos).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from centavos.
    ///
    /// ## Example
    /// ```rust
    /// use tindahan_core::money::Money;
    ///
    /// let price = Money::from_centavos(4550); // ₱45.50
    /// assert_eq!(price.centavos(), 4550);
    /// ```
    #[inline]
    pub const fn from_centavos(centavos: i64) -> Self {
        Money(centavos)
    }

    /// Returns the value in centavos.
    #[inline]
    pub const fn centavos(&self) -> i64 {
        self.0
    }

    /// Returns the whole-peso portion.
    #[inline]
    pub const fn pesos(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the centavo portion (always 0-99).
    #[inline]
    pub const fn centavos_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition; `field` names the amount in the overflow error.
    pub fn checked_add(self, other: Money, field: &str) -> Result<Money, ValidationError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| overflow(field))
    }

    /// Checked subtraction; `field` names the amount in the overflow error.
    pub fn checked_sub(self, other: Money, field: &str) -> Result<Money, ValidationError> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| overflow(field))
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use tindahan_core::money::Money;
    ///
    /// let unit = Money::from_centavos(500);
    /// assert_eq!(unit.checked_mul_qty(2, "line").unwrap().centavos(), 1000);
    /// ```
    pub fn checked_mul_qty(self, qty: i64, field: &str) -> Result<Money, ValidationError> {
        self.0
            .checked_mul(qty)
            .map(Money)
            .ok_or_else(|| overflow(field))
    }

    /// Percentage of this amount in basis points, floored.
    ///
    /// ## Example
    /// ```rust
    /// use tindahan_core::money::Money;
    ///
    /// // 5% of ₱9.99 = 49.95 centavos → 49
    /// assert_eq!(Money::from_centavos(999).percentage_floor(500).centavos(), 49);
    /// ```
    pub fn percentage_floor(&self, bps: u32) -> Money {
        // i128 keeps large subtotals from overflowing before the division
        let raw = (self.0 as i128 * bps as i128).div_euclid(BPS_SCALE as i128);
        Money(raw as i64)
    }

    /// `self - other`, but never below zero.
    #[inline]
    pub fn saturating_sub_floor(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }
}

fn overflow(field: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented rendering (`₱12.34`); devices do their own formatting.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₱{}.{:02}", sign, self.pesos().abs(), self.centavos_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl From<i64> for Money {
    fn from(centavos: i64) -> Self {
        Money(centavos)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_centavos(1234).to_string(), "₱12.34");
        assert_eq!(Money::from_centavos(5).to_string(), "₱0.05");
        assert_eq!(Money::from_centavos(-250).to_string(), "-₱2.50");
    }

    #[test]
    fn test_percentage_floor() {
        assert_eq!(Money::from_centavos(1000).percentage_floor(1000).centavos(), 100);
        assert_eq!(Money::from_centavos(999).percentage_floor(1000).centavos(), 99);
        assert_eq!(Money::from_centavos(1).percentage_floor(9999).centavos(), 0);
        assert_eq!(Money::from_centavos(1000).percentage_floor(0).centavos(), 0);
    }

    #[test]
    fn test_checked_arithmetic_overflow() {
        let big = Money::from_centavos(i64::MAX);
        assert!(big.checked_add(Money::from_centavos(1), "subtotal").is_err());
        assert!(big.checked_mul_qty(2, "line").is_err());
        assert_eq!(
            Money::from_centavos(300)
                .checked_sub(Money::from_centavos(100), "total")
                .unwrap()
                .centavos(),
            200
        );
    }

    #[test]
    fn test_saturating_sub_floor() {
        let balance = Money::from_centavos(600);
        assert_eq!(balance.saturating_sub_floor(Money::from_centavos(600)), Money::zero());
        assert_eq!(balance.saturating_sub_floor(Money::from_centavos(900)), Money::zero());
        assert_eq!(balance.saturating_sub_floor(Money::from_centavos(100)).centavos(), 500);
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, 650].into_iter().map(Money::from_centavos).sum();
        assert_eq!(total.centavos(), 1000);
    }
}
