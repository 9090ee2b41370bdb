//! Fixed-point unit prices and amounts.
//!
//! All money in the pipeline is a [`Price`]: a non-negative
//! [`Decimal`] carried at exactly two fractional digits and bounded by
//! [`Price::MAX`], the largest value a `NUMERIC(18,2)` column holds. Line
//! subtotals and order totals are computed with checked decimal arithmetic
//! only, so `total == sum(subtotals)` holds exactly and an out-of-range
//! result is an error rather than a panic.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Quantity;

/// Errors that can occur when constructing or combining [`Price`]s.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// Prices cannot be negative.
    #[error("price cannot be negative: {0}")]
    Negative(Decimal),
    /// More than two fractional digits would be silently rounded.
    #[error("price must have at most {max} fractional digits: {value}")]
    TooPrecise {
        /// The rejected value.
        value: Decimal,
        /// Maximum number of fractional digits.
        max: u32,
    },
    /// The amount does not fit the storage column.
    #[error("price exceeds {max}: {value}")]
    TooLarge {
        /// The rejected value.
        value: Decimal,
        /// Largest accepted amount.
        max: Decimal,
    },
    /// A subtotal or total would exceed [`Price::MAX`].
    #[error("amount overflow: result exceeds {}", Price::MAX)]
    Overflow,
}

/// A non-negative amount with two fractional digits.
///
/// ## Examples
///
/// ```
/// use online_retail_core::{Price, Quantity};
/// use rust_decimal::Decimal;
///
/// let unit = Price::new(Decimal::new(1999, 2)).unwrap();
/// let qty = Quantity::new(3).unwrap();
/// assert_eq!(unit.checked_times(qty).unwrap().to_string(), "59.97");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(transparent))]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Number of fractional digits every price carries.
    pub const SCALE: u32 = 2;

    /// Zero, at the canonical scale.
    pub const ZERO: Self = Self(Decimal::from_parts(0, 0, 0, false, Self::SCALE));

    /// `9999999999999999.99`, the largest `NUMERIC(18,2)` value.
    pub const MAX: Self = Self(Decimal::from_parts(
        0xA763_FFFF,
        0x0DE0_B6B3,
        0,
        false,
        Self::SCALE,
    ));

    /// Validate and rescale an amount.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] for amounts below zero,
    /// [`PriceError::TooPrecise`] when the amount has non-zero digits beyond
    /// the second fractional place, and [`PriceError::TooLarge`] above
    /// [`Price::MAX`].
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative(amount));
        }
        if amount > Self::MAX.0 {
            return Err(PriceError::TooLarge {
                value: amount,
                max: Self::MAX.0,
            });
        }

        let mut rescaled = amount.normalize();
        if rescaled.scale() > Self::SCALE {
            return Err(PriceError::TooPrecise {
                value: amount,
                max: Self::SCALE,
            });
        }
        rescaled.rescale(Self::SCALE);
        Ok(Self(rescaled))
    }

    /// Build a price from a count of cents.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] for negative input.
    pub fn from_cents(cents: i64) -> Result<Self, PriceError> {
        Self::new(Decimal::new(cents, Self::SCALE))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Line subtotal: this unit price multiplied by a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the product exceeds [`Price::MAX`].
    pub fn checked_times(self, quantity: Quantity) -> Result<Self, PriceError> {
        self.0
            .checked_mul(Decimal::from(quantity.get()))
            .map_or(Err(PriceError::Overflow), Self::bounded)
    }

    /// Sum of two amounts.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the sum exceeds [`Price::MAX`].
    pub fn checked_add(self, rhs: Self) -> Result<Self, PriceError> {
        self.0
            .checked_add(rhs.0)
            .map_or(Err(PriceError::Overflow), Self::bounded)
    }

    /// Sum of every amount; zero for an empty sequence.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if any partial sum exceeds
    /// [`Price::MAX`].
    pub fn checked_sum<I>(amounts: I) -> Result<Self, PriceError>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, Self::checked_add)
    }

    fn bounded(mut amount: Decimal) -> Result<Self, PriceError> {
        if amount > Self::MAX.0 {
            return Err(PriceError::Overflow);
        }
        amount.rescale(Self::SCALE);
        Ok(Self(amount))
    }
}

impl Default for Price {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_new_rescales_to_two_digits() {
        let price = Price::new(dec!(10)).unwrap();
        assert_eq!(price.amount().scale(), 2);
        assert_eq!(price.to_string(), "10.00");

        // Trailing zeros beyond the scale are not extra precision.
        assert_eq!(Price::new(dec!(5.500)).unwrap().to_string(), "5.50");
    }

    #[test]
    fn test_new_rejects_negative() {
        assert!(matches!(
            Price::new(dec!(-0.01)),
            Err(PriceError::Negative(_))
        ));
    }

    #[test]
    fn test_new_rejects_excess_precision() {
        assert!(matches!(
            Price::new(dec!(1.005)),
            Err(PriceError::TooPrecise { .. })
        ));
    }

    #[test]
    fn test_times_is_exact() {
        let unit = Price::new(dec!(0.10)).unwrap();
        let total = unit.checked_times(Quantity::new(3).unwrap()).unwrap();
        assert_eq!(total.amount(), dec!(0.30));
    }

    #[test]
    fn test_sum_has_no_drift() {
        let dime = Price::new(dec!(0.10)).unwrap();
        let total = Price::checked_sum(std::iter::repeat_n(dime, 10)).unwrap();
        assert_eq!(total, Price::new(dec!(1.00)).unwrap());
    }

    #[test]
    fn test_sum_of_empty_is_zero() {
        let total = Price::checked_sum(Vec::new()).unwrap();
        assert_eq!(total, Price::ZERO);
        assert_eq!(total.to_string(), "0.00");
    }

    #[test]
    fn test_serde_uses_decimal_string() {
        let price = Price::from_cents(2500).unwrap();
        let json = serde_json::to_string(&price).unwrap();
        assert_eq!(json, "\"25.00\"");

        let parsed: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, price);
        assert!(serde_json::from_str::<Price>("\"-1.00\"").is_err());
    }

    #[test]
    fn test_max_matches_numeric_18_2() {
        assert_eq!(Price::MAX.to_string(), "9999999999999999.99");
        assert_eq!(Price::new(dec!(9999999999999999.99)).unwrap(), Price::MAX);
    }

    #[test]
    fn test_new_rejects_amounts_above_max() {
        assert!(matches!(
            Price::new(dec!(10000000000000000.00)),
            Err(PriceError::TooLarge { .. })
        ));
        assert!(matches!(
            Price::new(Decimal::MAX),
            Err(PriceError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_arithmetic_overflow_is_an_error() {
        let two = Quantity::new(2).unwrap();
        assert_eq!(Price::MAX.checked_times(two), Err(PriceError::Overflow));
        assert_eq!(
            Price::MAX.checked_times(Quantity::new(i32::MAX).unwrap()),
            Err(PriceError::Overflow)
        );
        assert_eq!(Price::MAX.checked_add(Price::MAX), Err(PriceError::Overflow));
        assert_eq!(
            Price::checked_sum([Price::MAX, Price::from_cents(1).unwrap()]),
            Err(PriceError::Overflow)
        );

        let large = Price::new(dec!(4000000000000000.00)).unwrap();
        let sum = large.checked_add(large).unwrap();
        assert_eq!(sum.amount().scale(), 2);
        assert_eq!(sum.to_string(), "8000000000000000.00");
    }
}
