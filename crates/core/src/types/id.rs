//! Newtype IDs for type-safe entity references.
//!
//! Every table in the pipeline is keyed by a database-generated `i32`.
//! Wrapping each key in its own type keeps a `CartItemId` from being passed
//! where a `ProductId` is expected, which matters most in the cart API where
//! both arrive as bare integers from the caller.

/// Define a type-safe ID wrapper around a database `i32` key.
///
/// The generated type is:
/// - `Serialize`/`Deserialize` as a bare integer
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `Display` as the raw number (used in cache keys)
/// - convertible to and from `i32`
/// - a transparent `sqlx` type (with the `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use online_retail_core::define_id;
/// define_id!(ShipmentId);
///
/// let id = ShipmentId::new(7);
/// assert_eq!(id.as_i32(), 7);
/// assert_eq!(id.to_string(), "7");
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[cfg_attr(feature = "postgres", derive(::sqlx::Type))]
        #[cfg_attr(feature = "postgres", sqlx(transparent))]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// Wrap a raw key.
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            /// The raw key.
            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(CustomerId);
define_id!(ProductId);
define_id!(CartId);
define_id!(CartItemId);
define_id!(OrderId);
define_id!(OrderItemId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_raw_number() {
        assert_eq!(CustomerId::new(42).to_string(), "42");
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&OrderId::new(9)).unwrap();
        assert_eq!(json, "9");

        let parsed: OrderId = serde_json::from_str("9").unwrap();
        assert_eq!(parsed, OrderId::new(9));
    }

    #[test]
    fn test_i32_conversions() {
        let id = ProductId::from(3);
        assert_eq!(i32::from(id), 3);
        assert_eq!(id.as_i32(), 3);
    }
}
