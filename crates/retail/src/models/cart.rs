//! Cart views and mutation outcomes.

use serde::{Deserialize, Serialize};

use online_retail_core::{CartId, CartItemId, CustomerId, Price, ProductId, Quantity};

/// A customer's cart joined with the customer and product rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    pub cart_id: CartId,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub email: String,
    pub items: Vec<CartLineView>,
}

impl CartView {
    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The line for a product, if present.
    #[must_use]
    pub fn line_for(&self, product_id: ProductId) -> Option<&CartLineView> {
        self.items.iter().find(|line| line.product_id == product_id)
    }
}

/// One cart line with the product's *current* catalog data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineView {
    pub cart_item_id: CartItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_price: Price,
    pub image_url: String,
    pub quantity: Quantity,
}

/// Outcome of a cart mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartOutcome {
    /// The write was committed.
    Applied,
    /// Something the mutation needed does not exist; nothing was written.
    NotFound(CartMiss),
}

impl CartOutcome {
    /// Whether the write was committed.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Which lookup a cart mutation missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartMiss {
    Customer,
    Product,
    Cart,
    Item,
}
