//! Source-of-truth storage.
//!
//! # Backends
//!
//! - [`PgStore`] - `PostgreSQL` via `sqlx` (schema `retail`)
//! - [`MemoryStore`] - process-local tables for tests and demos
//!
//! ## Tables
//!
//! - `products` - Catalog with live prices
//! - `customers` - Profiles, unique by email
//! - `carts` - At most one per customer
//! - `cart_items` - Unique per (cart, product), cascade with the cart
//! - `orders` - Immutable order headers
//! - `order_items` - Price/name snapshots taken at placement
//!
//! # Migrations
//!
//! Migrations are stored in `crates/retail/migrations/` and run via:
//! ```bash
//! cargo run -p online-retail-cli -- migrate
//! ```

mod memory;
mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use online_retail_core::{CartId, CartItemId, CustomerId, Email, OrderId, ProductId, Quantity};

use crate::config::DatabaseConfig;
use crate::models::{
    CartOutcome, CartView, Customer, CustomerUpdate, DeleteOutcome, LockedCart, NewProduct,
    OrderDraft, OrderView, PersistedOrder, Product,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failure.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A concurrent writer changed rows this unit of work had locked in.
    #[error("concurrent modification: {0}")]
    Concurrency(String),
}

/// Customer row fields written at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    pub name: String,
    pub email: Email,
    pub address: Option<String>,
    pub phone_number: Option<String>,
}

/// The authoritative store behind every service.
///
/// Reads return `Ok(None)` (or an empty list) for missing rows. Cart
/// mutations report misses as [`CartOutcome::NotFound`]; nothing here
/// returns an error for an absent row.
#[async_trait]
pub trait RetailStore: Send + Sync {
    // -- products ----------------------------------------------------------

    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn insert_product(&self, product: &NewProduct) -> Result<Product, StoreError>;

    async fn update_product(
        &self,
        id: ProductId,
        product: &NewProduct,
    ) -> Result<Option<Product>, StoreError>;

    /// Delete a product. Cart lines for it go with it; order lines keep
    /// their snapshot.
    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError>;

    // -- customers ---------------------------------------------------------

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError>;

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;

    async fn get_customer_by_email(&self, email: &Email) -> Result<Option<Customer>, StoreError>;

    /// # Errors
    ///
    /// [`StoreError::Conflict`] if the email is already registered.
    async fn insert_customer(&self, customer: &CustomerRecord) -> Result<Customer, StoreError>;

    /// # Errors
    ///
    /// [`StoreError::Conflict`] if the new email belongs to another customer.
    async fn update_customer(
        &self,
        id: CustomerId,
        update: &CustomerUpdate,
    ) -> Result<Option<Customer>, StoreError>;

    async fn set_customer_external_id(
        &self,
        id: CustomerId,
        external_id: &str,
    ) -> Result<bool, StoreError>;

    /// Delete a customer and their cart, unless orders reference them.
    async fn delete_customer(&self, id: CustomerId) -> Result<DeleteOutcome, StoreError>;

    // -- carts -------------------------------------------------------------

    async fn list_carts(&self) -> Result<Vec<CartView>, StoreError>;

    async fn get_cart_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<CartView>, StoreError>;

    /// Customers whose cart has a line for `product_id`.
    async fn customers_holding(&self, product_id: ProductId)
    -> Result<Vec<CustomerId>, StoreError>;

    /// Find-or-create the customer's cart, then add `quantity` to the line
    /// for `product_id` (inserting it if absent).
    async fn add_cart_item(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartOutcome, StoreError>;

    async fn set_cart_item_quantity(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartOutcome, StoreError>;

    async fn remove_cart_item(
        &self,
        customer_id: CustomerId,
        cart_item_id: CartItemId,
    ) -> Result<CartOutcome, StoreError>;

    async fn remove_cart_product(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
    ) -> Result<CartOutcome, StoreError>;

    /// Remove every line. Clearing an empty cart is `Applied`.
    async fn clear_cart(&self, customer_id: CustomerId) -> Result<CartOutcome, StoreError>;

    // -- orders ------------------------------------------------------------

    async fn list_orders(&self) -> Result<Vec<OrderView>, StoreError>;

    async fn list_orders_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<OrderView>, StoreError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderView>, StoreError>;

    /// Open the unit of work that turns `customer_id`'s cart into an order.
    async fn begin_checkout(
        &self,
        customer_id: CustomerId,
    ) -> Result<Box<dyn CheckoutTx>, StoreError>;
}

/// One atomic cart-to-order conversion.
///
/// Dropping the value without calling [`commit`](Self::commit) rolls back
/// everything written through it.
#[async_trait]
pub trait CheckoutTx: Send {
    /// Read the customer's cart lines with current product data, locking
    /// them against concurrent checkouts until commit or rollback.
    async fn lock_cart(&mut self) -> Result<Option<LockedCart>, StoreError>;

    /// Write the order header and its lines.
    async fn insert_order(&mut self, draft: &OrderDraft) -> Result<PersistedOrder, StoreError>;

    /// Delete exactly `line_ids` from `cart_id`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Concurrency`] if any of the lines is already gone.
    async fn drain_cart(
        &mut self,
        cart_id: CartId,
        line_ids: &[CartItemId],
    ) -> Result<(), StoreError>;

    /// Make every write visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Create a `PostgreSQL` connection pool from configuration.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(config.url.expose_secret())
        .await
}

/// Apply pending migrations.
///
/// # Errors
///
/// Returns [`StoreError::Migration`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
