//! Shared pipeline handle.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheAside, CacheStore, MokaCacheStore};
use crate::config::{CacheConfig, CacheTtls};
use crate::db::RetailStore;
use crate::services::{
    CartManager, CustomerDirectory, IdentityProvisioner, OrderService, ProductCatalog,
};

/// Every service wired to one store and one cache.
///
/// This struct is cheaply cloneable via `Arc`; clones share the store
/// connection pool and the cache client.
#[derive(Clone)]
pub struct Retail {
    inner: Arc<RetailInner>,
}

struct RetailInner {
    catalog: ProductCatalog,
    customers: CustomerDirectory,
    carts: CartManager,
    orders: OrderService,
    operation_timeout: Option<Duration>,
}

impl Retail {
    /// Wire every service to `store` and `cache`.
    #[must_use]
    pub fn new(store: Arc<dyn RetailStore>, cache: Arc<dyn CacheStore>, ttls: CacheTtls) -> Self {
        Self::builder(store, cache, ttls).build()
    }

    /// Wire every service to `store` and an in-process moka cache.
    #[must_use]
    pub fn with_moka(store: Arc<dyn RetailStore>, config: &CacheConfig) -> Self {
        Self::new(
            store,
            Arc::new(MokaCacheStore::new(config.capacity)),
            config.ttls,
        )
    }

    /// Start wiring with optional collaborators.
    #[must_use]
    pub fn builder(
        store: Arc<dyn RetailStore>,
        cache: Arc<dyn CacheStore>,
        ttls: CacheTtls,
    ) -> RetailBuilder {
        RetailBuilder {
            store,
            cache: CacheAside::new(cache),
            ttls,
            identity: None,
            operation_timeout: None,
        }
    }

    /// Get a reference to the product catalog.
    #[must_use]
    pub fn catalog(&self) -> &ProductCatalog {
        &self.inner.catalog
    }

    /// Get a reference to the customer directory.
    #[must_use]
    pub fn customers(&self) -> &CustomerDirectory {
        &self.inner.customers
    }

    /// Get a reference to the cart manager.
    #[must_use]
    pub fn carts(&self) -> &CartManager {
        &self.inner.carts
    }

    /// Get a reference to the order service.
    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    /// Deadline callers should apply to each call, if configured.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.inner.operation_timeout
    }
}

impl std::fmt::Debug for Retail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retail")
            .field("customers", &self.inner.customers)
            .field("operation_timeout", &self.inner.operation_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Retail`].
pub struct RetailBuilder {
    store: Arc<dyn RetailStore>,
    cache: CacheAside,
    ttls: CacheTtls,
    identity: Option<Arc<dyn IdentityProvisioner>>,
    operation_timeout: Option<Duration>,
}

impl RetailBuilder {
    /// Provision an identity-provider account for each new customer.
    #[must_use]
    pub fn identity(mut self, identity: Arc<dyn IdentityProvisioner>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Default deadline for callers that honour [`Retail::operation_timeout`].
    #[must_use]
    pub const fn operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn build(self) -> Retail {
        let Self {
            store,
            cache,
            ttls,
            identity,
            operation_timeout,
        } = self;

        let mut customers = CustomerDirectory::new(Arc::clone(&store), cache.clone(), ttls);
        if let Some(identity) = identity {
            customers = customers.with_identity(identity);
        }

        Retail {
            inner: Arc::new(RetailInner {
                catalog: ProductCatalog::new(Arc::clone(&store), cache.clone(), ttls),
                customers,
                carts: CartManager::new(Arc::clone(&store), cache.clone(), ttls),
                orders: OrderService::new(store, cache, ttls),
                operation_timeout,
            }),
        }
    }
}

impl std::fmt::Debug for RetailBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetailBuilder")
            .field("ttls", &self.ttls)
            .field("identity", &self.identity.is_some())
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}
