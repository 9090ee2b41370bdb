//! Order placement end to end: totals, draining, rejection and rollback.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use rust_decimal_macros::dec;

use online_retail::RetailError;
use online_retail::db::StoreError;
use online_retail::models::{OrderView, PlaceOrderOutcome};
use online_retail_core::{CustomerId, Price, PriceError};
use online_retail_integration_tests::{TestContext, backend_tests};

fn price(amount: rust_decimal::Decimal) -> Price {
    Price::new(amount).unwrap()
}

fn placed(outcome: PlaceOrderOutcome) -> OrderView {
    match outcome {
        PlaceOrderOutcome::Placed(order) => order,
        other => panic!("expected a placed order, got {other:?}"),
    }
}

fn assert_totals_consistent(order: &OrderView) {
    for line in &order.items {
        assert_eq!(Ok(line.subtotal), line.unit_price.checked_times(line.quantity));
    }
    let summed = Price::checked_sum(order.items.iter().map(|l| l.subtotal)).unwrap();
    assert_eq!(order.total_amount, summed);
}

async fn two_line_cart_totals_25(ctx: &TestContext) {
    let c = ctx.customer("Carla").await.unwrap();
    let p = ctx.product("P", dec!(10.00)).await.unwrap();
    let q = ctx.product("Q", dec!(5.00)).await.unwrap();
    let carts = ctx.retail.carts();
    carts.add_item(c.id, p.id, 2).await.unwrap();
    carts.add_item(c.id, q.id, 1).await.unwrap();

    let order = placed(ctx.retail.orders().place_order(c.id).await.unwrap());

    assert_eq!(order.total_amount, price(dec!(25.00)));
    assert_eq!(order.items.len(), 2);
    let p_line = order.items.iter().find(|l| l.product_id == p.id).unwrap();
    let q_line = order.items.iter().find(|l| l.product_id == q.id).unwrap();
    assert_eq!(p_line.subtotal, price(dec!(20.00)));
    assert_eq!(q_line.subtotal, price(dec!(5.00)));
    assert_totals_consistent(&order);

    let cart = carts.get_by_customer(c.id).await.unwrap().unwrap();
    assert!(cart.is_empty());

    let fetched = ctx.retail.orders().get_by_id(order.order_id).await.unwrap();
    assert_eq!(fetched, Some(order));
}

async fn fractional_prices_do_not_drift(ctx: &TestContext) {
    let c = ctx.customer("Drift").await.unwrap();
    for (i, cents) in [dec!(0.10), dec!(0.20), dec!(19.99), dec!(0.01)].into_iter().enumerate() {
        let p = ctx.product(&format!("item{i}"), cents).await.unwrap();
        ctx.retail.carts().add_item(c.id, p.id, 3).await.unwrap();
    }

    let order = placed(ctx.retail.orders().place_order(c.id).await.unwrap());
    assert_eq!(order.total_amount, price(dec!(60.90)));
    assert_totals_consistent(&order);
}

async fn unknown_customer_creates_nothing(ctx: &TestContext) {
    let ghost = CustomerId::new(i32::MAX);
    let outcome = ctx.retail.orders().place_order(ghost).await.unwrap();
    assert_eq!(outcome, PlaceOrderOutcome::CustomerNotFound);
    assert!(ctx.retail.orders().get_by_customer(ghost).await.unwrap().is_empty());
}

async fn empty_or_missing_cart_creates_nothing(ctx: &TestContext) {
    let c = ctx.customer("Empty").await.unwrap();
    let p = ctx.product("Thing", dec!(1.00)).await.unwrap();
    let orders = ctx.retail.orders();

    assert_eq!(orders.place_order(c.id).await.unwrap(), PlaceOrderOutcome::CartEmpty);

    ctx.retail.carts().add_item(c.id, p.id, 1).await.unwrap();
    ctx.retail.carts().clear(c.id).await.unwrap();
    assert_eq!(orders.place_order(c.id).await.unwrap(), PlaceOrderOutcome::CartEmpty);

    assert!(orders.get_by_customer(c.id).await.unwrap().is_empty());
}

async fn price_is_taken_at_placement(ctx: &TestContext) {
    let c = ctx.customer("Snap").await.unwrap();
    let p = ctx.product("Lamp", dec!(10.00)).await.unwrap();
    ctx.retail.carts().add_item(c.id, p.id, 2).await.unwrap();

    // Price rises between add and checkout: the order uses the new price.
    let mut change = online_retail::models::NewProduct {
        name: p.name.clone(),
        description: None,
        price: price(dec!(12.50)),
        stock_quantity: p.stock_quantity,
        image_url: p.image_url.clone(),
    };
    ctx.retail.catalog().update(p.id, &change).await.unwrap();
    let order = placed(ctx.retail.orders().place_order(c.id).await.unwrap());
    assert_eq!(order.items[0].unit_price, price(dec!(12.50)));
    assert_eq!(order.total_amount, price(dec!(25.00)));

    // Later catalog edits and deletion never touch the recorded line.
    change.price = price(dec!(99.00));
    change.name = "Renamed".to_owned();
    ctx.retail.catalog().update(p.id, &change).await.unwrap();
    ctx.retail.catalog().delete(p.id).await.unwrap();

    let reread = ctx.store.get_order(order.order_id).await.unwrap().unwrap();
    assert_eq!(reread.items[0].unit_price, price(dec!(12.50)));
    assert_eq!(reread.items[0].product_name, "Lamp");
    assert_eq!(reread.total_amount, price(dec!(25.00)));
}

async fn placed_orders_are_listed_per_customer(ctx: &TestContext) {
    let c = ctx.customer("Repeat").await.unwrap();
    let p = ctx.product("Tea", dec!(4.00)).await.unwrap();
    let orders = ctx.retail.orders();

    assert!(orders.get_by_customer(c.id).await.unwrap().is_empty());

    ctx.retail.carts().add_item(c.id, p.id, 1).await.unwrap();
    let first = placed(orders.place_order(c.id).await.unwrap());
    ctx.retail.carts().add_item(c.id, p.id, 2).await.unwrap();
    let second = placed(orders.place_order(c.id).await.unwrap());

    let history = orders.get_by_customer(c.id).await.unwrap();
    assert_eq!(history, vec![first, second]);
}

async fn total_above_max_is_rejected(ctx: &TestContext) {
    let c = ctx.customer("Whale").await.unwrap();
    let yacht = ctx.product("Yacht", dec!(9999999999999999.99)).await.unwrap();
    let tender = ctx.product("Tender", dec!(0.01)).await.unwrap();
    ctx.retail.carts().add_item(c.id, yacht.id, 1).await.unwrap();
    ctx.retail.carts().add_item(c.id, tender.id, 1).await.unwrap();

    let err = ctx.retail.orders().place_order(c.id).await.unwrap_err();
    assert!(matches!(err, RetailError::Amount(PriceError::Overflow)));

    assert!(ctx.retail.orders().get_by_customer(c.id).await.unwrap().is_empty());
    let cart = ctx.retail.carts().get_by_customer(c.id).await.unwrap().unwrap();
    assert_eq!(cart.items.len(), 2);

    // Back within range, the same cart goes through.
    ctx.retail.carts().update_quantity(c.id, tender.id, 0).await.unwrap();
    let order = placed(ctx.retail.orders().place_order(c.id).await.unwrap());
    assert_eq!(order.total_amount, Price::MAX);
}

backend_tests!(
    total_above_max_is_rejected,
    two_line_cart_totals_25,
    fractional_prices_do_not_drift,
    unknown_customer_creates_nothing,
    empty_or_missing_cart_creates_nothing,
    price_is_taken_at_placement,
    placed_orders_are_listed_per_customer,
);

#[tokio::test]
async fn failed_drain_leaves_no_order_and_full_cart() {
    let ctx = TestContext::memory();
    let c = ctx.customer("Atomic").await.unwrap();
    let p = ctx.product("Vase", dec!(8.00)).await.unwrap();
    ctx.retail.carts().add_item(c.id, p.id, 2).await.unwrap();
    // Warm the cart cache; a failed placement must not invalidate into a
    // state that disagrees with the store.
    ctx.retail.carts().get_by_customer(c.id).await.unwrap();

    ctx.memory_store().unwrap().fail_next_drain();
    let err = ctx.retail.orders().place_order(c.id).await.unwrap_err();
    assert!(matches!(err, RetailError::Store(StoreError::Concurrency(_))));

    assert!(ctx.retail.orders().get_by_customer(c.id).await.unwrap().is_empty());
    assert_eq!(ctx.memory_store().unwrap().order_count().await, 0);
    let cart = ctx.retail.carts().get_by_customer(c.id).await.unwrap().unwrap();
    assert_eq!(cart.items[0].quantity.get(), 2);
}

#[tokio::test]
async fn placed_order_survives_failed_reread() {
    let ctx = TestContext::memory();
    let memory = ctx.memory_store().unwrap();
    let c = ctx.customer("Flaky").await.unwrap();
    let p = ctx.product("Desk", dec!(80.00)).await.unwrap();
    ctx.retail.carts().add_item(c.id, p.id, 1).await.unwrap();

    memory.fail_order_reads(true);
    let order = placed(ctx.retail.orders().place_order(c.id).await.unwrap());
    memory.fail_order_reads(false);

    assert_eq!(memory.order_count().await, 1);
    assert_eq!(ctx.retail.orders().get_by_id(order.order_id).await.unwrap(), Some(order));
    let retry = ctx.retail.orders().place_order(c.id).await.unwrap();
    assert_eq!(retry, PlaceOrderOutcome::CartEmpty);
}

#[tokio::test]
async fn expired_deadline_rolls_back() {
    use std::time::Duration;

    use online_retail::services::with_deadline;

    let ctx = TestContext::memory();
    let c = ctx.customer("Late").await.unwrap();
    let p = ctx.product("Clock", dec!(30.00)).await.unwrap();
    ctx.retail.carts().add_item(c.id, p.id, 1).await.unwrap();

    // Hold the checkout lock so placement blocks past its deadline.
    let blocker = ctx.store.begin_checkout(c.id).await.unwrap();
    let result = with_deadline(
        Duration::from_millis(50),
        ctx.retail.orders().place_order(c.id),
    )
    .await;
    assert!(matches!(result, Err(RetailError::Timeout(_))));
    drop(blocker);

    assert_eq!(ctx.memory_store().unwrap().order_count().await, 0);
    let order = placed(ctx.retail.orders().place_order(c.id).await.unwrap());
    assert_eq!(order.total_amount, price(dec!(30.00)));
}
