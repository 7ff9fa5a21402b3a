//! # Money Module
//!
//! Provides the `Money` type for handling rupee amounts safely.
//!
//! ## Why Integer Paise?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Refund conservation needs exact sums:                                  │
//! │    ₹99.90 + ₹0.10 must equal ₹100.00, every time                        │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Paise                                            │
//! │    9990 + 10 = 10000 paise, no rounding ambiguity                       │
//! │    total == subtotal + shipping + tax holds exactly                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use pustakam_core::money::Money;
//!
//! let price = Money::from_paise(24_900); // ₹249.00
//! let line = price.multiply_quantity(2);  // ₹498.00
//! assert_eq!(line.paise(), 49_800);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in paise (1/100 of a rupee).
///
/// ## Design Decisions
/// - **i64 (signed)**: differences (remaining refundable balance) may go
///   negative in intermediate math; stored amounts are validated `>= 0`
/// - **Single field tuple struct**: zero-cost over i64, stored as INTEGER
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from paise.
    ///
    /// ## Example
    /// ```rust
    /// use pustakam_core::money::Money;
    ///
    /// let price = Money::from_paise(19_950); // ₹199.50
    /// assert_eq!(price.rupees(), 199);
    /// ```
    #[inline]
    pub const fn from_paise(paise: i64) -> Self {
        Money(paise)
    }

    /// Creates a Money value from whole rupees.
    #[inline]
    pub const fn from_rupees(rupees: i64) -> Self {
        Money(rupees * 100)
    }

    /// Returns the value in paise.
    #[inline]
    pub const fn paise(&self) -> i64 {
        self.0
    }

    /// Returns the whole-rupee portion.
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the paise portion (always 0-99).
    #[inline]
    pub const fn paise_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Addition that returns `None` instead of overflowing.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Money(sum)),
            None => None,
        }
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Calculates tax at the given rate, rounding half up.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`, widened to i128 so a
    /// large basket cannot overflow.
    ///
    /// ## Example
    /// ```rust
    /// use pustakam_core::money::Money;
    /// use pustakam_core::types::TaxRate;
    ///
    /// let subtotal = Money::from_paise(10_000); // ₹100.00
    /// let tax = subtotal.calculate_tax(TaxRate::from_bps(1200)); // 12%
    /// assert_eq!(tax.paise(), 1_200);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        let tax_paise = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_paise(tax_paise as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money as `₹199.50`. The storefront formats for display itself;
/// this is for logs and error messages.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₹{}.{:02}", sign, self.rupees().abs(), self.paise_part())
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

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_paise() {
        let money = Money::from_paise(19_950);
        assert_eq!(money.paise(), 19_950);
        assert_eq!(money.rupees(), 199);
        assert_eq!(money.paise_part(), 50);
        assert_eq!(Money::from_rupees(300).paise(), 30_000);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_paise(19_950).to_string(), "₹199.50");
        assert_eq!(Money::from_paise(500).to_string(), "₹5.00");
        assert_eq!(Money::from_paise(-550).to_string(), "-₹5.50");
        assert_eq!(Money::zero().to_string(), "₹0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_paise(1000);
        let b = Money::from_paise(500);

        assert_eq!((a + b).paise(), 1500);
        assert_eq!((a - b).paise(), 500);
        assert_eq!((a * 3).paise(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.paise(), 2000);
    }

    #[test]
    fn test_checked_add() {
        let a = Money::from_paise(1000);
        assert_eq!(a.checked_add(a), Some(Money::from_paise(2000)));
        assert_eq!(Money::from_paise(i64::MAX).checked_add(a), None);
    }

    #[test]
    fn test_tax_rounding() {
        // ₹10.00 at 8.25% = 82.5 paise → 83
        let tax = Money::from_paise(1000).calculate_tax(TaxRate::from_bps(825));
        assert_eq!(tax.paise(), 83);

        // Books are GST-exempt by default
        let tax = Money::from_paise(1000).calculate_tax(TaxRate::zero());
        assert!(tax.is_zero());
    }

    #[test]
    fn test_sign_checks() {
        assert!(Money::zero().is_zero());
        assert!(Money::from_paise(1).is_positive());
        assert!(Money::from_paise(-1).is_negative());
    }
}
