//! Cart aggregate manager.

use std::sync::Arc;

use tracing::{debug, instrument};

use online_retail_core::{CartItemId, CustomerId, ProductId, Quantity};

use crate::cache::{CacheAside, keys};
use crate::config::CacheTtls;
use crate::db::RetailStore;
use crate::error::RetailError;
use crate::models::{CartOutcome, CartView};

/// Owns each customer's single cart and its lines.
///
/// Mutations report misses as [`CartOutcome::NotFound`] and invalidate
/// `carts` and `cart:customer:{id}` only once the write has committed.
#[derive(Clone)]
pub struct CartManager {
    store: Arc<dyn RetailStore>,
    cache: CacheAside,
    ttls: CacheTtls,
}

impl CartManager {
    #[must_use]
    pub fn new(store: Arc<dyn RetailStore>, cache: CacheAside, ttls: CacheTtls) -> Self {
        Self { store, cache, ttls }
    }

    /// Every cart with its customer and lines.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the source of truth fails on a miss.
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<CartView>, RetailError> {
        let store = &self.store;
        Ok(self
            .cache
            .read_through(keys::CARTS, self.ttls.carts, || store.list_carts())
            .await?)
    }

    /// The customer's cart, or `None` if they never added anything.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the source of truth fails on a miss.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn get_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<CartView>, RetailError> {
        let store = &self.store;
        Ok(self
            .cache
            .read_through_optional(&keys::cart_of_customer(customer_id), self.ttls.carts, || {
                store.get_cart_by_customer(customer_id)
            })
            .await?)
    }

    /// Add `quantity` of a product, creating the cart on first use. An
    /// existing line for the product is incremented.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::InvalidQuantity`] unless `quantity > 0`, or
    /// [`RetailError::Store`] if the write fails.
    #[instrument(skip(self), fields(customer_id = %customer_id, product_id = %product_id))]
    pub async fn add_item(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartOutcome, RetailError> {
        let quantity = Quantity::new(quantity).map_err(|_| RetailError::InvalidQuantity(quantity))?;
        let outcome = self
            .store
            .add_cart_item(customer_id, product_id, quantity)
            .await?;
        Ok(self.settle(customer_id, outcome).await)
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::InvalidQuantity`] for negative quantities, or
    /// [`RetailError::Store`] if the write fails.
    #[instrument(skip(self), fields(customer_id = %customer_id, product_id = %product_id))]
    pub async fn update_quantity(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartOutcome, RetailError> {
        let outcome = if quantity == 0 {
            self.store
                .remove_cart_product(customer_id, product_id)
                .await?
        } else {
            let quantity =
                Quantity::new(quantity).map_err(|_| RetailError::InvalidQuantity(quantity))?;
            self.store
                .set_cart_item_quantity(customer_id, product_id, quantity)
                .await?
        };
        Ok(self.settle(customer_id, outcome).await)
    }

    /// Remove one line by its id.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the write fails.
    #[instrument(skip(self), fields(customer_id = %customer_id, cart_item_id = %cart_item_id))]
    pub async fn remove_item(
        &self,
        customer_id: CustomerId,
        cart_item_id: CartItemId,
    ) -> Result<CartOutcome, RetailError> {
        let outcome = self
            .store
            .remove_cart_item(customer_id, cart_item_id)
            .await?;
        Ok(self.settle(customer_id, outcome).await)
    }

    /// Remove every line. Clearing an empty cart succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the write fails.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn clear(&self, customer_id: CustomerId) -> Result<CartOutcome, RetailError> {
        let outcome = self.store.clear_cart(customer_id).await?;
        Ok(self.settle(customer_id, outcome).await)
    }

    async fn settle(&self, customer_id: CustomerId, outcome: CartOutcome) -> CartOutcome {
        match outcome {
            CartOutcome::Applied => {
                self.cache.invalidate_all(&keys::cart_keys(customer_id)).await;
            }
            CartOutcome::NotFound(miss) => debug!(?miss, "cart mutation missed"),
        }
        outcome
    }
}

impl std::fmt::Debug for CartManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartManager")
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}
