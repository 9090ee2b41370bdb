//! Product catalog with read-through caching.

use std::sync::Arc;

use tracing::instrument;

use online_retail_core::{CustomerId, ProductId};

use crate::cache::{CacheAside, keys};
use crate::config::CacheTtls;
use crate::db::RetailStore;
use crate::error::RetailError;
use crate::models::{NewProduct, Product};

/// Read and write access to products.
///
/// Cart views embed the live product name and price, so a product write
/// also invalidates the cart keys of every customer holding that product.
#[derive(Clone)]
pub struct ProductCatalog {
    store: Arc<dyn RetailStore>,
    cache: CacheAside,
    ttls: CacheTtls,
}

impl ProductCatalog {
    #[must_use]
    pub fn new(store: Arc<dyn RetailStore>, cache: CacheAside, ttls: CacheTtls) -> Self {
        Self { store, cache, ttls }
    }

    /// All products.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the source of truth fails on a miss.
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<Product>, RetailError> {
        let store = &self.store;
        Ok(self
            .cache
            .read_through(keys::PRODUCTS, self.ttls.products, || store.list_products())
            .await?)
    }

    /// A product by id, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the source of truth fails on a miss.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RetailError> {
        let store = &self.store;
        Ok(self
            .cache
            .read_through_optional(&keys::product(id), self.ttls.products, || {
                store.get_product(id)
            })
            .await?)
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the insert fails.
    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn add(&self, product: &NewProduct) -> Result<Product, RetailError> {
        let created = self.store.insert_product(product).await?;
        self.cache
            .invalidate_all(&[keys::PRODUCTS.to_owned(), keys::product(created.id)])
            .await;
        Ok(created)
    }

    /// Replace a product's fields. `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the update fails.
    #[instrument(skip(self, product), fields(product_id = %id))]
    pub async fn update(
        &self,
        id: ProductId,
        product: &NewProduct,
    ) -> Result<Option<Product>, RetailError> {
        let holders = self.cart_holders(id).await?;
        let updated = self.store.update_product(id, product).await?;
        if updated.is_some() {
            self.invalidate(id, &holders).await;
        }
        Ok(updated)
    }

    /// Delete a product. Lines for it leave every cart; placed orders keep
    /// their snapshot. Returns whether a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the delete fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete(&self, id: ProductId) -> Result<bool, RetailError> {
        let holders = self.cart_holders(id).await?;
        let deleted = self.store.delete_product(id).await?;
        if deleted {
            self.invalidate(id, &holders).await;
        }
        Ok(deleted)
    }

    /// Customers whose cart currently holds `id`.
    async fn cart_holders(&self, id: ProductId) -> Result<Vec<CustomerId>, RetailError> {
        Ok(self.store.customers_holding(id).await?)
    }

    async fn invalidate(&self, id: ProductId, holders: &[CustomerId]) {
        let mut stale = vec![keys::PRODUCTS.to_owned(), keys::product(id)];
        if !holders.is_empty() {
            stale.push(keys::CARTS.to_owned());
            stale.extend(holders.iter().map(|&c| keys::cart_of_customer(c)));
        }
        self.cache.invalidate_all(&stale).await;
    }
}

impl std::fmt::Debug for ProductCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductCatalog")
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use online_retail_core::{Price, Quantity};

    use super::*;
    use crate::cache::tests::BrokenCache;
    use crate::db::MemoryStore;
    use crate::services::fixtures;

    fn catalog(store: &MemoryStore, cache: CacheAside) -> ProductCatalog {
        ProductCatalog::new(fixtures::shared(store), cache, CacheTtls::default())
    }

    #[tokio::test]
    async fn test_get_by_id_serves_cached_copy_until_write() {
        let store = MemoryStore::new();
        let cache = fixtures::moka();
        let catalog = catalog(&store, cache.clone());
        let lamp = fixtures::product(&store, "lamp", dec!(10.00)).await;

        assert_eq!(catalog.get_by_id(lamp.id).await.unwrap(), Some(lamp.clone()));
        assert!(cache.get::<Product>(&keys::product(lamp.id)).await.is_some());

        let mut change = fixtures::new_product("lamp", dec!(12.00));
        change.stock_quantity = 1;
        catalog.update(lamp.id, &change).await.unwrap().unwrap();

        let reread = catalog.get_by_id(lamp.id).await.unwrap().unwrap();
        assert_eq!(reread.price, Price::new(dec!(12.00)).unwrap());
        assert_eq!(reread.stock_quantity, 1);
    }

    #[tokio::test]
    async fn test_missing_product_is_none() {
        let store = MemoryStore::new();
        let catalog = catalog(&store, fixtures::moka());
        assert!(catalog.get_by_id(ProductId::new(404)).await.unwrap().is_none());
        assert!(catalog
            .update(ProductId::new(404), &fixtures::new_product("x", dec!(1)))
            .await
            .unwrap()
            .is_none());
        assert!(!catalog.delete(ProductId::new(404)).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_invalidates_collection() {
        let store = MemoryStore::new();
        let catalog = catalog(&store, fixtures::moka());
        assert!(catalog.get_all().await.unwrap().is_empty());

        catalog
            .add(&fixtures::new_product("mug", dec!(4.50)))
            .await
            .unwrap();
        assert_eq!(catalog.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_price_change_invalidates_holder_carts() {
        let store = MemoryStore::new();
        let cache = fixtures::moka();
        let catalog = catalog(&store, cache.clone());
        let ada = fixtures::customer(&store, "Ada", "ada@example.com").await;
        let lamp = fixtures::product(&store, "lamp", dec!(10.00)).await;
        store
            .add_cart_item(ada.id, lamp.id, Quantity::new(1).unwrap())
            .await
            .unwrap();
        cache
            .set(&keys::cart_of_customer(ada.id), &"stale", CacheTtls::default().carts)
            .await;

        catalog
            .update(lamp.id, &fixtures::new_product("lamp", dec!(11.00)))
            .await
            .unwrap();
        assert!(cache.get::<String>(&keys::cart_of_customer(ada.id)).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_leaves_other_carts_cached() {
        let store = MemoryStore::new();
        let cache = fixtures::moka();
        let catalog = catalog(&store, cache.clone());
        let ada = fixtures::customer(&store, "Ada", "ada@example.com").await;
        let bob = fixtures::customer(&store, "Bob", "bob@example.com").await;
        let lamp = fixtures::product(&store, "lamp", dec!(10.00)).await;
        let mug = fixtures::product(&store, "mug", dec!(3.00)).await;
        store
            .add_cart_item(ada.id, lamp.id, Quantity::new(1).unwrap())
            .await
            .unwrap();
        store
            .add_cart_item(bob.id, mug.id, Quantity::new(1).unwrap())
            .await
            .unwrap();
        let ttl = CacheTtls::default().carts;
        cache.set(&keys::cart_of_customer(ada.id), &"ada", ttl).await;
        cache.set(&keys::cart_of_customer(bob.id), &"bob", ttl).await;

        assert!(catalog.delete(lamp.id).await.unwrap());

        assert!(cache.get::<String>(&keys::cart_of_customer(ada.id)).await.is_none());
        assert_eq!(
            cache.get::<String>(&keys::cart_of_customer(bob.id)).await.as_deref(),
            Some("bob")
        );
    }

    #[tokio::test]
    async fn test_broken_cache_falls_back_to_store() {
        let store = MemoryStore::new();
        let catalog = catalog(&store, CacheAside::new(Arc::new(BrokenCache)));
        let lamp = fixtures::product(&store, "lamp", dec!(10.00)).await;

        assert_eq!(catalog.get_all().await.unwrap(), vec![lamp.clone()]);
        assert!(catalog.delete(lamp.id).await.unwrap());
        assert!(catalog.get_by_id(lamp.id).await.unwrap().is_none());
    }
}
