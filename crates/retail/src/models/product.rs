//! Catalog records.

use serde::{Deserialize, Serialize};

use online_retail_core::{Price, ProductId};

/// A catalog product as read from the source of truth.
///
/// The price here is the *live* price. Orders never keep a reference to it;
/// they copy it into an order line at placement time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub stock_quantity: i32,
    pub image_url: String,
}

/// Fields for creating or replacing a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub stock_quantity: i32,
    pub image_url: String,
}
