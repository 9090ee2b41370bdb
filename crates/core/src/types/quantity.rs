//! Line-item quantities.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// Quantities must be at least one.
    #[error("quantity must be positive, got {0}")]
    NotPositive(i32),
    /// Accumulating quantities overflowed.
    #[error("quantity overflow")]
    Overflow,
}

/// A strictly positive number of units on a cart or order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(transparent))]
#[serde(try_from = "i32", into = "i32")]
pub struct Quantity(i32);

impl Quantity {
    /// Validate a raw quantity.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::NotPositive`] for zero or negative input.
    pub const fn new(value: i32) -> Result<Self, QuantityError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(QuantityError::NotPositive(value))
        }
    }

    /// The raw value.
    #[must_use]
    pub const fn get(&self) -> i32 {
        self.0
    }

    /// Add two quantities, as when the same product is added to a cart twice.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::Overflow`] if the sum exceeds `i32::MAX`.
    pub const fn checked_add(self, other: Self) -> Result<Self, QuantityError> {
        match self.0.checked_add(other.0) {
            Some(sum) => Ok(Self(sum)),
            None => Err(QuantityError::Overflow),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for i32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}
