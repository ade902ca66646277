//! # Money Module
//!
//! Provides the `Money` type for prices, costs and totals.
//!
//! ## Where floats are allowed
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Stored values          Money (i64 cents)   price, cost, sale totals    │
//! │  Tax breakdown          f64 dollars         TaxResult, never stored     │
//! │                                                                         │
//! │  Cart subtotal (cents) ──► as_dollars() ──► calculate_tax()            │
//! │                                                  │                      │
//! │  Sale.tax_cents ◄── from_dollars_rounded() ◄─────┘                      │
//! │                                                                         │
//! │  Rounding happens exactly once, when a sale is persisted.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use barback_core::money::Money;
//!
//! let price = Money::parse("12.50").unwrap();
//! assert_eq!(price.cents(), 1250);
//! assert_eq!((price * 2).to_string(), "$25.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// Signed so refunds and voids can be expressed as negative amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-dollar portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
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

    /// Multiplies a unit price by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// The value as floating-point dollars, for the tax calculator.
    ///
    /// ## Example
    /// ```rust
    /// use barback_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(1099).as_dollars(), 10.99);
    /// ```
    #[inline]
    pub fn as_dollars(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Converts floating-point dollars to cents, rounding half away from zero.
    ///
    /// Used once per sale to persist the tax total computed by
    /// [`crate::tax::calculate_tax`].
    ///
    /// ## Example
    /// ```rust
    /// use barback_core::money::Money;
    ///
    /// assert_eq!(Money::from_dollars_rounded(1.4975).cents(), 150);
    /// assert_eq!(Money::from_dollars_rounded(0.825).cents(), 83);
    /// assert_eq!(Money::from_dollars_rounded(-0.005).cents(), -1);
    /// ```
    pub fn from_dollars_rounded(dollars: f64) -> Self {
        if !dollars.is_finite() {
            return Money::zero();
        }
        // 0.825 * 100 is 82.4999.. in binary, nudge past the half-cent boundary
        let scaled = dollars * 100.0;
        let nudged = scaled + scaled.signum() * 1e-7;
        Money(nudged.round() as i64)
    }

    /// Parses a decimal dollar string such as `"12.5"`, `"$1,299.99"` or `"-3"`.
    ///
    /// ## Rules
    /// - Optional leading `-` and `$`
    /// - Thousands separators `,` are ignored
    /// - At most two fraction digits (no silent truncation)
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let mut s = input.trim();
        let negative = s.starts_with('-');
        if negative {
            s = &s[1..];
        }
        s = s.strip_prefix('$').unwrap_or(s);
        let cleaned: String = s.chars().filter(|c| *c != ',').collect();
        if cleaned.is_empty() {
            return Err(invalid("empty amount"));
        }

        let (whole, frac) = match cleaned.split_once('.') {
            Some((w, f)) => (w, f),
            None => (cleaned.as_str(), ""),
        };
        if frac.len() > 2 {
            return Err(invalid("more than two decimal places"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("not a decimal number"));
        }
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("not a decimal number"));
        }

        let whole_cents = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<i64>()
                .ok()
                .and_then(|w| w.checked_mul(100))
                .ok_or_else(|| invalid("amount too large"))?
        };
        let frac_cents = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid("not a decimal number"))? * 10,
            _ => frac.parse::<i64>().map_err(|_| invalid("not a decimal number"))?,
        };

        let cents = whole_cents + frac_cents;
        Ok(Money(if negative { -cents } else { cents }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
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
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "$10.99");
        assert_eq!(Money::from_cents(500).to_string(), "$5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-$5.50");
        assert_eq!(Money::from_cents(0).to_string(), "$0.00");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_parse_accepts_common_formats() {
        assert_eq!(Money::parse("12").unwrap().cents(), 1200);
        assert_eq!(Money::parse("12.5").unwrap().cents(), 1250);
        assert_eq!(Money::parse("12.05").unwrap().cents(), 1205);
        assert_eq!(Money::parse("$1,299.99").unwrap().cents(), 129_999);
        assert_eq!(Money::parse(" .75 ").unwrap().cents(), 75);
        assert_eq!(Money::parse("-3").unwrap().cents(), -300);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Money::parse("").is_err());
        assert!(Money::parse("abc").is_err());
        assert!(Money::parse("1.234").is_err());
        assert!(Money::parse("1.2.3").is_err());
        assert!(Money::parse(".").is_err());
        assert!(Money::parse("99999999999999999999").is_err());
    }

    #[test]
    fn test_from_dollars_rounded() {
        assert_eq!(Money::from_dollars_rounded(5.0).cents(), 500);
        assert_eq!(Money::from_dollars_rounded(14.975).cents(), 1498);
        assert_eq!(Money::from_dollars_rounded(0.004).cents(), 0);
        assert_eq!(Money::from_dollars_rounded(f64::NAN).cents(), 0);
    }

    #[test]
    fn test_as_dollars_round_trip() {
        let m = Money::from_cents(4321);
        assert_eq!(Money::from_dollars_rounded(m.as_dollars()), m);
    }
}
