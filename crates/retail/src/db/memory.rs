//! Process-local [`RetailStore`].
//!
//! All tables live behind one async mutex. A checkout takes the mutex for
//! its whole lifetime and writes to a private copy of the tables, which
//! replaces the shared copy on commit; dropping the checkout discards it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use online_retail_core::{
    CartId, CartItemId, CustomerId, Email, OrderId, OrderItemId, Price, ProductId, Quantity,
};

use super::{CheckoutTx, CustomerRecord, RetailStore, StoreError};
use crate::models::{
    CartLineView, CartMiss, CartOutcome, CartView, Customer, CustomerUpdate, DeleteOutcome,
    LockedCart, LockedLine, NewProduct, OrderDraft, OrderLineView, OrderView, PersistedOrder,
    Product,
};

#[derive(Debug, Clone)]
struct CartRow {
    id: CartId,
    customer_id: CustomerId,
}

#[derive(Debug, Clone)]
struct CartItemRow {
    id: CartItemId,
    cart_id: CartId,
    product_id: ProductId,
    quantity: Quantity,
}

#[derive(Debug, Clone)]
struct OrderRow {
    id: OrderId,
    customer_id: CustomerId,
    placed_at: DateTime<Utc>,
    total_amount: Price,
}

#[derive(Debug, Clone)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    product_name: String,
    image_url: String,
    unit_price: Price,
    quantity: Quantity,
    subtotal: Price,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: i32,
    products: BTreeMap<ProductId, Product>,
    customers: BTreeMap<CustomerId, Customer>,
    carts: BTreeMap<CartId, CartRow>,
    cart_items: BTreeMap<CartItemId, CartItemRow>,
    orders: BTreeMap<OrderId, OrderRow>,
    order_items: BTreeMap<OrderItemId, OrderItemRow>,
}

impl Tables {
    /// One sequence for every table, like a shared `SERIAL`.
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn cart_of(&self, customer_id: CustomerId) -> Option<&CartRow> {
        self.carts.values().find(|c| c.customer_id == customer_id)
    }

    fn line_for(&self, cart_id: CartId, product_id: ProductId) -> Option<CartItemId> {
        self.cart_items
            .values()
            .find(|i| i.cart_id == cart_id && i.product_id == product_id)
            .map(|i| i.id)
    }

    fn email_taken(&self, email: &Email, except: Option<CustomerId>) -> bool {
        self.customers
            .values()
            .any(|c| &c.email == email && Some(c.id) != except)
    }

    fn cart_view(&self, cart: &CartRow) -> Result<CartView, StoreError> {
        let customer = self.customers.get(&cart.customer_id).ok_or_else(|| {
            StoreError::DataCorruption(format!("cart {} has no customer", cart.id))
        })?;

        let items = self
            .cart_items
            .values()
            .filter(|i| i.cart_id == cart.id)
            .map(|i| {
                let product = self.products.get(&i.product_id).ok_or_else(|| {
                    StoreError::DataCorruption(format!("cart item {} has no product", i.id))
                })?;
                Ok(CartLineView {
                    cart_item_id: i.id,
                    product_id: product.id,
                    product_name: product.name.clone(),
                    product_price: product.price,
                    image_url: product.image_url.clone(),
                    quantity: i.quantity,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(CartView {
            cart_id: cart.id,
            customer_id: customer.id,
            customer_name: customer.name.clone(),
            email: customer.email.to_string(),
            items,
        })
    }

    fn order_view(&self, order: &OrderRow) -> Result<OrderView, StoreError> {
        let customer = self.customers.get(&order.customer_id).ok_or_else(|| {
            StoreError::DataCorruption(format!("order {} has no customer", order.id))
        })?;

        let items = self
            .order_items
            .values()
            .filter(|i| i.order_id == order.id)
            .map(|i| OrderLineView {
                order_item_id: i.id,
                product_id: i.product_id,
                product_name: i.product_name.clone(),
                image_url: i.image_url.clone(),
                unit_price: i.unit_price,
                quantity: i.quantity,
                subtotal: i.subtotal,
            })
            .collect();

        Ok(OrderView {
            order_id: order.id,
            customer_id: customer.id,
            customer_name: customer.name.clone(),
            email: customer.email.to_string(),
            placed_at: order.placed_at,
            total_amount: order.total_amount,
            items,
        })
    }
}

/// Failures the store can be told to produce.
#[derive(Debug, Default)]
struct Faults {
    next_drain: AtomicBool,
    next_external_id_write: AtomicBool,
    order_reads: AtomicBool,
}

impl Faults {
    fn take(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::SeqCst)
    }

    fn order_read(&self) -> Result<(), StoreError> {
        if self.order_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

/// In-memory implementation of [`RetailStore`].
///
/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(any(test, feature = "testing"))]
impl MemoryStore {
    /// Make the next checkout fail at the cart-drain step, after its order
    /// rows were written.
    pub fn fail_next_drain(&self) {
        self.faults.next_drain.store(true, Ordering::SeqCst);
    }

    /// Make the next `set_customer_external_id` fail.
    pub fn fail_next_external_id_write(&self) {
        self.faults.next_external_id_write.store(true, Ordering::SeqCst);
    }

    /// Make every order read fail with a pool timeout until switched off.
    pub fn fail_order_reads(&self, failing: bool) {
        self.faults.order_reads.store(failing, Ordering::SeqCst);
    }

    /// Number of order headers currently stored.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }
}

#[async_trait]
impl RetailStore for MemoryStore {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.tables.lock().await.products.values().cloned().collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.tables.lock().await.products.get(&id).cloned())
    }

    async fn insert_product(&self, product: &NewProduct) -> Result<Product, StoreError> {
        let mut t = self.tables.lock().await;
        let id = ProductId::new(t.next_id());
        let row = Product {
            id,
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price,
            stock_quantity: product.stock_quantity,
            image_url: product.image_url.clone(),
        };
        t.products.insert(id, row.clone());
        Ok(row)
    }

    async fn update_product(
        &self,
        id: ProductId,
        product: &NewProduct,
    ) -> Result<Option<Product>, StoreError> {
        let mut t = self.tables.lock().await;
        let Some(row) = t.products.get_mut(&id) else {
            return Ok(None);
        };
        row.name.clone_from(&product.name);
        row.description.clone_from(&product.description);
        row.price = product.price;
        row.stock_quantity = product.stock_quantity;
        row.image_url.clone_from(&product.image_url);
        Ok(Some(row.clone()))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        if t.products.remove(&id).is_none() {
            return Ok(false);
        }
        t.cart_items.retain(|_, i| i.product_id != id);
        Ok(true)
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        Ok(self.tables.lock().await.customers.values().cloned().collect())
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.tables.lock().await.customers.get(&id).cloned())
    }

    async fn get_customer_by_email(&self, email: &Email) -> Result<Option<Customer>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.customers.values().find(|c| &c.email == email).cloned())
    }

    async fn insert_customer(&self, customer: &CustomerRecord) -> Result<Customer, StoreError> {
        let mut t = self.tables.lock().await;
        if t.email_taken(&customer.email, None) {
            return Err(StoreError::Conflict("email already exists".to_owned()));
        }
        let id = CustomerId::new(t.next_id());
        let row = Customer {
            id,
            name: customer.name.clone(),
            email: customer.email.clone(),
            address: customer.address.clone(),
            phone_number: customer.phone_number.clone(),
            external_id: None,
        };
        t.customers.insert(id, row.clone());
        Ok(row)
    }

    async fn update_customer(
        &self,
        id: CustomerId,
        update: &CustomerUpdate,
    ) -> Result<Option<Customer>, StoreError> {
        let mut t = self.tables.lock().await;
        if !t.customers.contains_key(&id) {
            return Ok(None);
        }
        if t.email_taken(&update.email, Some(id)) {
            return Err(StoreError::Conflict("email already exists".to_owned()));
        }
        let Some(row) = t.customers.get_mut(&id) else {
            return Ok(None);
        };
        row.name.clone_from(&update.name);
        row.email = update.email.clone();
        row.address.clone_from(&update.address);
        row.phone_number.clone_from(&update.phone_number);
        Ok(Some(row.clone()))
    }

    async fn set_customer_external_id(
        &self,
        id: CustomerId,
        external_id: &str,
    ) -> Result<bool, StoreError> {
        if Faults::take(&self.faults.next_external_id_write) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut t = self.tables.lock().await;
        Ok(t.customers.get_mut(&id).is_some_and(|row| {
            row.external_id = Some(external_id.to_owned());
            true
        }))
    }

    async fn delete_customer(&self, id: CustomerId) -> Result<DeleteOutcome, StoreError> {
        let mut t = self.tables.lock().await;
        if !t.customers.contains_key(&id) {
            return Ok(DeleteOutcome::NotFound);
        }
        if t.orders.values().any(|o| o.customer_id == id) {
            return Ok(DeleteOutcome::InUse);
        }
        if let Some(cart_id) = t.cart_of(id).map(|c| c.id) {
            t.cart_items.retain(|_, i| i.cart_id != cart_id);
            t.carts.remove(&cart_id);
        }
        t.customers.remove(&id);
        Ok(DeleteOutcome::Deleted)
    }

    async fn list_carts(&self) -> Result<Vec<CartView>, StoreError> {
        let t = self.tables.lock().await;
        t.carts.values().map(|c| t.cart_view(c)).collect()
    }

    async fn get_cart_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<CartView>, StoreError> {
        let t = self.tables.lock().await;
        t.cart_of(customer_id).map(|c| t.cart_view(c)).transpose()
    }

    async fn customers_holding(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<CustomerId>, StoreError> {
        let t = self.tables.lock().await;
        let mut holders: Vec<CustomerId> = t
            .cart_items
            .values()
            .filter(|i| i.product_id == product_id)
            .filter_map(|i| t.carts.get(&i.cart_id).map(|c| c.customer_id))
            .collect();
        holders.sort_unstable();
        holders.dedup();
        Ok(holders)
    }

    async fn add_cart_item(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartOutcome, StoreError> {
        let mut t = self.tables.lock().await;
        if !t.customers.contains_key(&customer_id) {
            return Ok(CartOutcome::NotFound(CartMiss::Customer));
        }
        if !t.products.contains_key(&product_id) {
            return Ok(CartOutcome::NotFound(CartMiss::Product));
        }

        let cart_id = if let Some(cart) = t.cart_of(customer_id) {
            cart.id
        } else {
            let id = CartId::new(t.next_id());
            t.carts.insert(id, CartRow { id, customer_id });
            id
        };

        if let Some(line_id) = t.line_for(cart_id, product_id) {
            if let Some(line) = t.cart_items.get_mut(&line_id) {
                line.quantity = line
                    .quantity
                    .checked_add(quantity)
                    .map_err(|e| StoreError::Conflict(e.to_string()))?;
            }
        } else {
            let id = CartItemId::new(t.next_id());
            t.cart_items.insert(
                id,
                CartItemRow {
                    id,
                    cart_id,
                    product_id,
                    quantity,
                },
            );
        }
        Ok(CartOutcome::Applied)
    }

    async fn set_cart_item_quantity(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartOutcome, StoreError> {
        let mut t = self.tables.lock().await;
        let Some(cart_id) = t.cart_of(customer_id).map(|c| c.id) else {
            return Ok(CartOutcome::NotFound(CartMiss::Cart));
        };
        let Some(line_id) = t.line_for(cart_id, product_id) else {
            return Ok(CartOutcome::NotFound(CartMiss::Item));
        };
        if let Some(line) = t.cart_items.get_mut(&line_id) {
            line.quantity = quantity;
        }
        Ok(CartOutcome::Applied)
    }

    async fn remove_cart_item(
        &self,
        customer_id: CustomerId,
        cart_item_id: CartItemId,
    ) -> Result<CartOutcome, StoreError> {
        let mut t = self.tables.lock().await;
        let Some(cart_id) = t.cart_of(customer_id).map(|c| c.id) else {
            return Ok(CartOutcome::NotFound(CartMiss::Cart));
        };
        match t.cart_items.get(&cart_item_id) {
            Some(line) if line.cart_id == cart_id => {
                t.cart_items.remove(&cart_item_id);
                Ok(CartOutcome::Applied)
            }
            _ => Ok(CartOutcome::NotFound(CartMiss::Item)),
        }
    }

    async fn remove_cart_product(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
    ) -> Result<CartOutcome, StoreError> {
        let mut t = self.tables.lock().await;
        let Some(cart_id) = t.cart_of(customer_id).map(|c| c.id) else {
            return Ok(CartOutcome::NotFound(CartMiss::Cart));
        };
        let Some(line_id) = t.line_for(cart_id, product_id) else {
            return Ok(CartOutcome::NotFound(CartMiss::Item));
        };
        t.cart_items.remove(&line_id);
        Ok(CartOutcome::Applied)
    }

    async fn clear_cart(&self, customer_id: CustomerId) -> Result<CartOutcome, StoreError> {
        let mut t = self.tables.lock().await;
        let Some(cart_id) = t.cart_of(customer_id).map(|c| c.id) else {
            return Ok(CartOutcome::NotFound(CartMiss::Cart));
        };
        t.cart_items.retain(|_, i| i.cart_id != cart_id);
        Ok(CartOutcome::Applied)
    }

    async fn list_orders(&self) -> Result<Vec<OrderView>, StoreError> {
        self.faults.order_read()?;
        let t = self.tables.lock().await;
        t.orders.values().map(|o| t.order_view(o)).collect()
    }

    async fn list_orders_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<OrderView>, StoreError> {
        self.faults.order_read()?;
        let t = self.tables.lock().await;
        t.orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .map(|o| t.order_view(o))
            .collect()
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderView>, StoreError> {
        self.faults.order_read()?;
        let t = self.tables.lock().await;
        t.orders.get(&id).map(|o| t.order_view(o)).transpose()
    }

    async fn begin_checkout(
        &self,
        customer_id: CustomerId,
    ) -> Result<Box<dyn CheckoutTx>, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryCheckout {
            guard,
            working,
            customer_id,
            fail_drain: Faults::take(&self.faults.next_drain),
        }))
    }
}

/// Checkout over a private copy of the tables.
struct MemoryCheckout {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    customer_id: CustomerId,
    fail_drain: bool,
}

#[async_trait]
impl CheckoutTx for MemoryCheckout {
    async fn lock_cart(&mut self) -> Result<Option<LockedCart>, StoreError> {
        let t = &self.working;
        let Some(cart) = t.cart_of(self.customer_id) else {
            return Ok(None);
        };

        let lines = t
            .cart_items
            .values()
            .filter(|i| i.cart_id == cart.id)
            .map(|i| {
                let product = t.products.get(&i.product_id).ok_or_else(|| {
                    StoreError::DataCorruption(format!("cart item {} has no product", i.id))
                })?;
                Ok(LockedLine {
                    cart_item_id: i.id,
                    product_id: product.id,
                    product_name: product.name.clone(),
                    image_url: product.image_url.clone(),
                    unit_price: product.price,
                    quantity: i.quantity,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(Some(LockedCart {
            cart_id: cart.id,
            lines,
        }))
    }

    async fn insert_order(&mut self, draft: &OrderDraft) -> Result<PersistedOrder, StoreError> {
        let t = &mut self.working;
        if !t.customers.contains_key(&draft.customer_id) {
            return Err(StoreError::Conflict(format!(
                "customer {} does not exist",
                draft.customer_id
            )));
        }

        let order_id = OrderId::new(t.next_id());
        t.orders.insert(
            order_id,
            OrderRow {
                id: order_id,
                customer_id: draft.customer_id,
                placed_at: draft.placed_at,
                total_amount: draft.total_amount,
            },
        );
        let mut item_ids = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            let id = OrderItemId::new(t.next_id());
            item_ids.push(id);
            t.order_items.insert(
                id,
                OrderItemRow {
                    id,
                    order_id,
                    product_id: line.product_id,
                    product_name: line.product_name.clone(),
                    image_url: line.image_url.clone(),
                    unit_price: line.unit_price,
                    quantity: line.quantity,
                    subtotal: line.subtotal,
                },
            );
        }
        Ok(PersistedOrder { order_id, item_ids })
    }

    async fn drain_cart(
        &mut self,
        cart_id: CartId,
        line_ids: &[CartItemId],
    ) -> Result<(), StoreError> {
        if self.fail_drain {
            return Err(StoreError::Concurrency("injected drain failure".to_owned()));
        }

        let t = &mut self.working;
        for id in line_ids {
            match t.cart_items.get(id) {
                Some(line) if line.cart_id == cart_id => {
                    t.cart_items.remove(id);
                }
                _ => {
                    return Err(StoreError::Concurrency(format!(
                        "cart item {id} disappeared during checkout"
                    )));
                }
            }
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
