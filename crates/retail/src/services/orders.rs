//! Order reads and the order placement engine.
//!
//! Placement walks a fixed sequence of stages:
//!
//! ```text
//! Validating -> Snapshotting -> Persisting -> CacheInvalidating -> Complete
//!      \
//!       -> Rejected (unknown customer, or no cart lines)
//! ```
//!
//! Validating and Snapshotting read the source of truth, never the cache.
//! Snapshotting happens inside the checkout unit of work, after the cart
//! lines are locked, so each price is read exactly once and the lines that
//! are priced are exactly the lines that are drained. Persisting writes the
//! order, drains the cart and commits as one unit; any failure before the
//! commit drops the unit of work and nothing is applied. Cache
//! invalidation runs only after the commit and cannot undo it.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tracing::{Span, debug, error, info, instrument};

use online_retail_core::{CustomerId, OrderId};

use crate::cache::{CacheAside, keys};
use crate::config::CacheTtls;
use crate::db::{RetailStore, StoreError};
use crate::error::RetailError;
use crate::models::{OrderDraft, OrderView, PersistedOrder, PlaceOrderOutcome, PlacementStage};

/// Order history and checkout.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn RetailStore>,
    cache: CacheAside,
    ttls: CacheTtls,
}

impl OrderService {
    #[must_use]
    pub fn new(store: Arc<dyn RetailStore>, cache: CacheAside, ttls: CacheTtls) -> Self {
        Self { store, cache, ttls }
    }

    /// Every order.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the source of truth fails on a miss.
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<OrderView>, RetailError> {
        let store = &self.store;
        Ok(self
            .cache
            .read_through(keys::ORDERS, self.ttls.orders, || store.list_orders())
            .await?)
    }

    /// An order by id, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the source of truth fails on a miss.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get_by_id(&self, id: OrderId) -> Result<Option<OrderView>, RetailError> {
        let store = &self.store;
        Ok(self
            .cache
            .read_through_optional(&keys::order(id), self.ttls.orders, || store.get_order(id))
            .await?)
    }

    /// Every order placed by a customer.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Store`] if the source of truth fails on a miss.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn get_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<OrderView>, RetailError> {
        let store = &self.store;
        Ok(self
            .cache
            .read_through(
                &keys::orders_of_customer(customer_id),
                self.ttls.orders,
                || store.list_orders_by_customer(customer_id),
            )
            .await?)
    }

    /// Convert the customer's cart into an order.
    ///
    /// Unknown customers and empty carts are reported through
    /// [`PlaceOrderOutcome`] and write nothing. The returned view is built
    /// from the committed draft, so a placed order is always reported as
    /// placed, even if the store cannot be read again afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RetailError::Amount`] if the total is out of range, or
    /// [`RetailError::Store`] if any write fails; the order is then not
    /// created and the cart is left untouched.
    #[instrument(skip(self), fields(customer_id = %customer_id, stage = tracing::field::Empty))]
    pub async fn place_order(
        &self,
        customer_id: CustomerId,
    ) -> Result<PlaceOrderOutcome, RetailError> {
        enter(PlacementStage::Validating);
        let Some(customer) = self.store.get_customer(customer_id).await? else {
            enter(PlacementStage::Rejected);
            info!("customer not found");
            return Ok(PlaceOrderOutcome::CustomerNotFound);
        };

        let mut checkout = self.store.begin_checkout(customer_id).await?;
        let cart = match checkout.lock_cart().await? {
            Some(cart) if !cart.lines.is_empty() => cart,
            _ => {
                enter(PlacementStage::Rejected);
                info!("cart empty");
                return Ok(PlaceOrderOutcome::CartEmpty);
            }
        };

        enter(PlacementStage::Snapshotting);
        // Stored timestamps keep microseconds.
        let placed_at = Utc::now().trunc_subsecs(6);
        let draft = OrderDraft::from_locked(customer_id, placed_at, &cart.lines)
            .inspect_err(|e| error!(error = %e, "order total out of range"))?;
        debug!(lines = draft.lines.len(), total = %draft.total_amount, "cart priced");

        enter(PlacementStage::Persisting);
        let persisted: Result<PersistedOrder, StoreError> = async {
            let persisted = checkout.insert_order(&draft).await?;
            checkout.drain_cart(cart.cart_id, &cart.line_ids()).await?;
            checkout.commit().await?;
            Ok(persisted)
        }
        .await;
        let persisted = persisted
            .inspect_err(|e| error!(error = %e, "order placement rolled back"))?;
        let order_id = persisted.order_id;

        enter(PlacementStage::CacheInvalidating);
        self.cache
            .invalidate_all(&[
                keys::ORDERS.to_owned(),
                keys::order(order_id),
                keys::orders_of_customer(customer_id),
                keys::CARTS.to_owned(),
                keys::cart_of_customer(customer_id),
            ])
            .await;

        let order = OrderView::from_draft(order_id, &customer, &draft, &persisted.item_ids);

        enter(PlacementStage::Complete);
        info!(
            order_id = %order.order_id,
            items = order.items.len(),
            total = %order.total_amount,
            "order placed"
        );
        Ok(PlaceOrderOutcome::Placed(order))
    }
}

/// Record the current stage on the placement span.
fn enter(stage: PlacementStage) {
    Span::current().record("stage", tracing::field::debug(stage));
    debug!(?stage, "placement stage");
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService")
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rust_decimal_macros::dec;

    use online_retail_core::{Price, PriceError, Quantity};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::CartView;
    use crate::services::fixtures;

    fn orders(store: &MemoryStore, cache: CacheAside) -> OrderService {
        OrderService::new(fixtures::shared(store), cache, CacheTtls::default())
    }

    fn placed(outcome: PlaceOrderOutcome) -> OrderView {
        match outcome {
            PlaceOrderOutcome::Placed(order) => order,
            other => panic!("expected a placed order, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_place_order_totals_and_drains() {
        let store = MemoryStore::new();
        let service = orders(&store, fixtures::moka());
        let c = fixtures::customer(&store, "Ada", "ada@example.com").await;
        let p = fixtures::product(&store, "P", dec!(10.00)).await;
        let q = fixtures::product(&store, "Q", dec!(5.00)).await;
        store.add_cart_item(c.id, p.id, Quantity::new(2).unwrap()).await.unwrap();
        store.add_cart_item(c.id, q.id, Quantity::new(1).unwrap()).await.unwrap();

        let order = placed(service.place_order(c.id).await.unwrap());

        assert_eq!(order.total_amount, Price::new(dec!(25.00)).unwrap());
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].subtotal, Price::new(dec!(20.00)).unwrap());
        assert_eq!(order.items[1].subtotal, Price::new(dec!(5.00)).unwrap());
        assert_eq!(order.customer_name, "Ada");
        assert_eq!(order.items[0].product_name, "P");

        let cart = store.get_cart_by_customer(c.id).await.unwrap().unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_customer_is_rejected() {
        let store = MemoryStore::new();
        let service = orders(&store, fixtures::moka());

        let outcome = service.place_order(CustomerId::new(42)).await.unwrap();
        assert_eq!(outcome, PlaceOrderOutcome::CustomerNotFound);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_or_empty_cart_is_rejected() {
        let store = MemoryStore::new();
        let service = orders(&store, fixtures::moka());
        let c = fixtures::customer(&store, "Ada", "ada@example.com").await;
        let p = fixtures::product(&store, "P", dec!(1.00)).await;

        assert_eq!(service.place_order(c.id).await.unwrap(), PlaceOrderOutcome::CartEmpty);

        store.add_cart_item(c.id, p.id, Quantity::new(1).unwrap()).await.unwrap();
        store.clear_cart(c.id).await.unwrap();
        assert_eq!(service.place_order(c.id).await.unwrap(), PlaceOrderOutcome::CartEmpty);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_drain_rolls_back_everything() {
        let store = MemoryStore::new();
        let service = orders(&store, fixtures::moka());
        let c = fixtures::customer(&store, "Ada", "ada@example.com").await;
        let p = fixtures::product(&store, "P", dec!(3.00)).await;
        store.add_cart_item(c.id, p.id, Quantity::new(4).unwrap()).await.unwrap();

        store.fail_next_drain();
        let err = service.place_order(c.id).await.unwrap_err();
        assert!(matches!(err, RetailError::Store(StoreError::Concurrency(_))));

        assert_eq!(store.order_count().await, 0);
        let cart = store.get_cart_by_customer(c.id).await.unwrap().unwrap();
        assert_eq!(cart.items[0].quantity.get(), 4);

        // The next attempt goes through.
        placed(service.place_order(c.id).await.unwrap());
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_out_of_range_total_is_rejected_without_writes() {
        let store = MemoryStore::new();
        let service = orders(&store, fixtures::moka());
        let c = fixtures::customer(&store, "Ada", "ada@example.com").await;
        let p = fixtures::product(&store, "P", dec!(9999999999999999.99)).await;
        let q = fixtures::product(&store, "Q", dec!(9999999999999999.99)).await;
        store.add_cart_item(c.id, p.id, Quantity::new(1).unwrap()).await.unwrap();
        store.add_cart_item(c.id, q.id, Quantity::new(1).unwrap()).await.unwrap();

        let err = service.place_order(c.id).await.unwrap_err();
        assert!(matches!(err, RetailError::Amount(PriceError::Overflow)));
        assert_eq!(store.order_count().await, 0);
        let cart = store.get_cart_by_customer(c.id).await.unwrap().unwrap();
        assert_eq!(cart.items.len(), 2);

        // A single line over the bound fails the same way.
        store.remove_cart_product(c.id, q.id).await.unwrap();
        store.set_cart_item_quantity(c.id, p.id, Quantity::new(3).unwrap()).await.unwrap();
        let err = service.place_order(c.id).await.unwrap_err();
        assert!(matches!(err, RetailError::Amount(PriceError::Overflow)));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_committed_order_is_placed_when_reads_fail() {
        let store = MemoryStore::new();
        let service = orders(&store, fixtures::moka());
        let c = fixtures::customer(&store, "Ada", "ada@example.com").await;
        let p = fixtures::product(&store, "P", dec!(6.00)).await;
        store.add_cart_item(c.id, p.id, Quantity::new(2).unwrap()).await.unwrap();

        store.fail_order_reads(true);
        let order = placed(service.place_order(c.id).await.unwrap());
        assert!(service.get_by_id(order.order_id).await.is_err());
        store.fail_order_reads(false);

        assert_eq!(order.total_amount, Price::new(dec!(12.00)).unwrap());
        assert_eq!(store.get_order(order.order_id).await.unwrap(), Some(order));
        assert!(store.get_cart_by_customer(c.id).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_price_is_snapshotted_at_placement() {
        let store = MemoryStore::new();
        let service = orders(&store, fixtures::moka());
        let c = fixtures::customer(&store, "Ada", "ada@example.com").await;
        let p = fixtures::product(&store, "P", dec!(10.00)).await;
        store.add_cart_item(c.id, p.id, Quantity::new(1).unwrap()).await.unwrap();

        store
            .update_product(p.id, &fixtures::new_product("P", dec!(12.00)))
            .await
            .unwrap();
        let order = placed(service.place_order(c.id).await.unwrap());
        assert_eq!(order.items[0].unit_price, Price::new(dec!(12.00)).unwrap());

        store
            .update_product(p.id, &fixtures::new_product("P renamed", dec!(99.00)))
            .await
            .unwrap();
        let reread = service.get_by_id(order.order_id).await.unwrap().unwrap();
        assert_eq!(reread.items[0].unit_price, Price::new(dec!(12.00)).unwrap());
        assert_eq!(reread.items[0].product_name, "P");
    }

    #[tokio::test]
    async fn test_placement_invalidates_cached_cart_and_orders() {
        let store = MemoryStore::new();
        let cache = fixtures::moka();
        let service = orders(&store, cache.clone());
        let c = fixtures::customer(&store, "Ada", "ada@example.com").await;
        let p = fixtures::product(&store, "P", dec!(2.00)).await;
        store.add_cart_item(c.id, p.id, Quantity::new(1).unwrap()).await.unwrap();

        let before = store.get_cart_by_customer(c.id).await.unwrap().unwrap();
        cache
            .set(&keys::cart_of_customer(c.id), &before, CacheTtls::default().carts)
            .await;
        assert!(service.get_by_customer(c.id).await.unwrap().is_empty());
        assert!(service.get_all().await.unwrap().is_empty());

        let order = placed(service.place_order(c.id).await.unwrap());

        assert!(cache.get::<CartView>(&keys::cart_of_customer(c.id)).await.is_none());
        assert_eq!(service.get_by_customer(c.id).await.unwrap(), vec![order.clone()]);
        assert_eq!(service.get_all().await.unwrap(), vec![order]);
    }

    #[tokio::test]
    async fn test_concurrent_placements_do_not_double_spend() {
        let store = MemoryStore::new();
        let service = orders(&store, fixtures::moka());
        let c = fixtures::customer(&store, "Ada", "ada@example.com").await;
        let p = fixtures::product(&store, "P", dec!(7.00)).await;
        store.add_cart_item(c.id, p.id, Quantity::new(3).unwrap()).await.unwrap();

        let (a, b) = tokio::join!(service.place_order(c.id), service.place_order(c.id));
        let outcomes = [a.unwrap(), b.unwrap()];

        let placed_count = outcomes
            .iter()
            .filter(|o| matches!(o, PlaceOrderOutcome::Placed(_)))
            .count();
        assert_eq!(placed_count, 1);
        assert!(outcomes.contains(&PlaceOrderOutcome::CartEmpty));
        assert_eq!(store.order_count().await, 1);
    }
}
