//! Order views, the placement draft, and placement outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use online_retail_core::{
    CartId, CartItemId, CustomerId, OrderId, OrderItemId, Price, PriceError, ProductId, Quantity,
};

use super::Customer;

/// A persisted order as shown to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub email: String,
    pub placed_at: DateTime<Utc>,
    pub total_amount: Price,
    pub items: Vec<OrderLineView>,
}

/// One order line. Every field is the value recorded at placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineView {
    pub order_item_id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub image_url: String,
    pub unit_price: Price,
    pub quantity: Quantity,
    pub subtotal: Price,
}

/// A cart line read under the checkout lock, with the product price as of
/// that read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedLine {
    pub cart_item_id: CartItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub image_url: String,
    pub unit_price: Price,
    pub quantity: Quantity,
}

/// The customer's cart as seen by a checkout unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedCart {
    pub cart_id: CartId,
    pub lines: Vec<LockedLine>,
}

impl LockedCart {
    /// Ids of every line that was read; exactly these are drained.
    #[must_use]
    pub fn line_ids(&self) -> Vec<CartItemId> {
        self.lines.iter().map(|line| line.cart_item_id).collect()
    }
}

/// A priced order that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub customer_id: CustomerId,
    pub placed_at: DateTime<Utc>,
    pub total_amount: Price,
    pub lines: Vec<OrderDraftLine>,
}

impl OrderDraft {
    /// Price every locked line once and total the subtotals.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if a subtotal or the total exceeds
    /// [`Price::MAX`].
    pub fn from_locked(
        customer_id: CustomerId,
        placed_at: DateTime<Utc>,
        lines: &[LockedLine],
    ) -> Result<Self, PriceError> {
        let lines = lines
            .iter()
            .map(|line| {
                Ok(OrderDraftLine {
                    product_id: line.product_id,
                    product_name: line.product_name.clone(),
                    image_url: line.image_url.clone(),
                    unit_price: line.unit_price,
                    quantity: line.quantity,
                    subtotal: line.unit_price.checked_times(line.quantity)?,
                })
            })
            .collect::<Result<Vec<_>, PriceError>>()?;
        let total_amount = Price::checked_sum(lines.iter().map(|line| line.subtotal))?;

        Ok(Self {
            customer_id,
            placed_at,
            total_amount,
            lines,
        })
    }
}

impl OrderView {
    /// The view of a freshly written order, built from its draft and the
    /// ids the store assigned to it.
    ///
    /// `item_ids` are in draft line order.
    #[must_use]
    pub fn from_draft(
        order_id: OrderId,
        customer: &Customer,
        draft: &OrderDraft,
        item_ids: &[OrderItemId],
    ) -> Self {
        let items = draft
            .lines
            .iter()
            .zip(item_ids)
            .map(|(line, &order_item_id)| OrderLineView {
                order_item_id,
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                image_url: line.image_url.clone(),
                unit_price: line.unit_price,
                quantity: line.quantity,
                subtotal: line.subtotal,
            })
            .collect();

        Self {
            order_id,
            customer_id: customer.id,
            customer_name: customer.name.clone(),
            email: customer.email.to_string(),
            placed_at: draft.placed_at,
            total_amount: draft.total_amount,
            items,
        }
    }
}

/// Ids assigned to an order and its lines when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedOrder {
    pub order_id: OrderId,
    /// One id per draft line, in draft line order.
    pub item_ids: Vec<OrderItemId>,
}

/// One line of an [`OrderDraft`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraftLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub image_url: String,
    pub unit_price: Price,
    pub quantity: Quantity,
    pub subtotal: Price,
}

/// Outcome of placing an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceOrderOutcome {
    /// The order was written and the cart drained.
    Placed(OrderView),
    /// No customer with that id exists.
    CustomerNotFound,
    /// The customer has no cart, or the cart has no lines.
    CartEmpty,
}

/// Steps of order placement, recorded on the tracing span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStage {
    Validating,
    Snapshotting,
    Persisting,
    CacheInvalidating,
    Complete,
    Rejected,
}
