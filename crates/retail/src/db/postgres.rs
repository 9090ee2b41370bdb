//! `PostgreSQL` implementation of [`RetailStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use online_retail_core::{
    CartId, CartItemId, CustomerId, Email, OrderId, OrderItemId, Price, ProductId, Quantity,
};

use super::{CheckoutTx, CustomerRecord, RetailStore, StoreError};
use crate::models::{
    CartLineView, CartMiss, CartOutcome, CartView, Customer, CustomerUpdate, DeleteOutcome,
    LockedCart, LockedLine, NewProduct, OrderDraft, OrderLineView, OrderView, PersistedOrder,
    Product,
};

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    description: Option<String>,
    price: Decimal,
    stock_quantity: i32,
    image_url: String,
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: i32,
    name: String,
    email: String,
    address: Option<String>,
    phone_number: Option<String>,
    external_id: Option<String>,
}

/// One row of `carts ⟕ cart_items ⟕ products`; item columns are null for an
/// empty cart.
#[derive(sqlx::FromRow)]
struct CartLineRow {
    cart_id: i32,
    customer_id: i32,
    customer_name: String,
    email: String,
    cart_item_id: Option<i32>,
    product_id: Option<i32>,
    product_name: Option<String>,
    product_price: Option<Decimal>,
    image_url: Option<String>,
    quantity: Option<i32>,
}

/// One row of `orders ⟕ order_items`.
#[derive(sqlx::FromRow)]
struct OrderLineRow {
    order_id: i32,
    customer_id: i32,
    customer_name: String,
    email: String,
    placed_at: DateTime<Utc>,
    total_amount: Decimal,
    order_item_id: Option<i32>,
    product_id: Option<i32>,
    product_name: Option<String>,
    image_url: Option<String>,
    unit_price: Option<Decimal>,
    quantity: Option<i32>,
    subtotal: Option<Decimal>,
}

#[derive(sqlx::FromRow)]
struct LockedLineRow {
    cart_item_id: i32,
    product_id: i32,
    product_name: String,
    image_url: String,
    unit_price: Decimal,
    quantity: i32,
}

// =============================================================================
// Conversions
// =============================================================================

fn parse_email(raw: &str) -> Result<Email, StoreError> {
    Email::parse(raw)
        .map_err(|e| StoreError::DataCorruption(format!("invalid email in database: {e}")))
}

fn parse_price(raw: Decimal) -> Result<Price, StoreError> {
    Price::new(raw)
        .map_err(|e| StoreError::DataCorruption(format!("invalid price in database: {e}")))
}

fn parse_quantity(raw: i32) -> Result<Quantity, StoreError> {
    Quantity::new(raw)
        .map_err(|e| StoreError::DataCorruption(format!("invalid quantity in database: {e}")))
}

fn missing(column: &str) -> StoreError {
    StoreError::DataCorruption(format!("unexpected null in {column}"))
}

/// Map a unique-constraint violation to [`StoreError::Conflict`].
fn conflict_on_unique(e: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::Conflict(format!("{what} already exists"));
    }
    StoreError::Database(e)
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            description: row.description,
            price: parse_price(row.price)?,
            stock_quantity: row.stock_quantity,
            image_url: row.image_url,
        })
    }
}

impl TryFrom<CustomerRow> for Customer {
    type Error = StoreError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CustomerId::new(row.id),
            name: row.name,
            email: parse_email(&row.email)?,
            address: row.address,
            phone_number: row.phone_number,
            external_id: row.external_id,
        })
    }
}

impl TryFrom<LockedLineRow> for LockedLine {
    type Error = StoreError;

    fn try_from(row: LockedLineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            cart_item_id: CartItemId::new(row.cart_item_id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            image_url: row.image_url,
            unit_price: parse_price(row.unit_price)?,
            quantity: parse_quantity(row.quantity)?,
        })
    }
}

/// Fold ordered join rows into one view per cart.
fn group_carts(rows: Vec<CartLineRow>) -> Result<Vec<CartView>, StoreError> {
    let mut carts: Vec<CartView> = Vec::new();
    for row in rows {
        let cart_id = CartId::new(row.cart_id);
        if carts.last().is_none_or(|c| c.cart_id != cart_id) {
            carts.push(CartView {
                cart_id,
                customer_id: CustomerId::new(row.customer_id),
                customer_name: row.customer_name,
                email: row.email,
                items: Vec::new(),
            });
        }
        let Some(cart_item_id) = row.cart_item_id else {
            continue;
        };
        let line = CartLineView {
            cart_item_id: CartItemId::new(cart_item_id),
            product_id: ProductId::new(row.product_id.ok_or_else(|| missing("product_id"))?),
            product_name: row.product_name.ok_or_else(|| missing("product_name"))?,
            product_price: parse_price(row.product_price.ok_or_else(|| missing("price"))?)?,
            image_url: row.image_url.ok_or_else(|| missing("image_url"))?,
            quantity: parse_quantity(row.quantity.ok_or_else(|| missing("quantity"))?)?,
        };
        if let Some(cart) = carts.last_mut() {
            cart.items.push(line);
        }
    }
    Ok(carts)
}

/// Fold ordered join rows into one view per order.
fn group_orders(rows: Vec<OrderLineRow>) -> Result<Vec<OrderView>, StoreError> {
    let mut orders: Vec<OrderView> = Vec::new();
    for row in rows {
        let order_id = OrderId::new(row.order_id);
        if orders.last().is_none_or(|o| o.order_id != order_id) {
            orders.push(OrderView {
                order_id,
                customer_id: CustomerId::new(row.customer_id),
                customer_name: row.customer_name,
                email: row.email,
                placed_at: row.placed_at,
                total_amount: parse_price(row.total_amount)?,
                items: Vec::new(),
            });
        }
        let Some(order_item_id) = row.order_item_id else {
            continue;
        };
        let line = OrderLineView {
            order_item_id: OrderItemId::new(order_item_id),
            product_id: ProductId::new(row.product_id.ok_or_else(|| missing("product_id"))?),
            product_name: row.product_name.ok_or_else(|| missing("product_name"))?,
            image_url: row.image_url.ok_or_else(|| missing("image_url"))?,
            unit_price: parse_price(row.unit_price.ok_or_else(|| missing("unit_price"))?)?,
            quantity: parse_quantity(row.quantity.ok_or_else(|| missing("quantity"))?)?,
            subtotal: parse_price(row.subtotal.ok_or_else(|| missing("subtotal"))?)?,
        };
        if let Some(order) = orders.last_mut() {
            order.items.push(line);
        }
    }
    Ok(orders)
}

// =============================================================================
// Queries
// =============================================================================

const PRODUCT_COLUMNS: &str = "id, name, description, price, stock_quantity, image_url";

const CUSTOMER_COLUMNS: &str = "id, name, email, address, phone_number, external_id";

/// `$1` optionally filters by customer.
const CART_VIEW_QUERY: &str = r"
    SELECT c.id AS cart_id, c.customer_id, cu.name AS customer_name, cu.email,
           ci.id AS cart_item_id, ci.product_id, p.name AS product_name,
           p.price AS product_price, p.image_url, ci.quantity
    FROM retail.carts c
    JOIN retail.customers cu ON cu.id = c.customer_id
    LEFT JOIN retail.cart_items ci ON ci.cart_id = c.id
    LEFT JOIN retail.products p ON p.id = ci.product_id
    WHERE $1::INT IS NULL OR c.customer_id = $1
    ORDER BY c.id, ci.id
";

/// `$1` optionally filters by order id, `$2` by customer.
const ORDER_VIEW_QUERY: &str = r"
    SELECT o.id AS order_id, o.customer_id, cu.name AS customer_name, cu.email,
           o.placed_at, o.total_amount,
           oi.id AS order_item_id, oi.product_id, oi.product_name, oi.image_url,
           oi.unit_price, oi.quantity, oi.subtotal
    FROM retail.orders o
    JOIN retail.customers cu ON cu.id = o.customer_id
    LEFT JOIN retail.order_items oi ON oi.order_id = o.id
    WHERE ($1::INT IS NULL OR o.id = $1)
      AND ($2::INT IS NULL OR o.customer_id = $2)
    ORDER BY o.id, oi.id
";

/// `PostgreSQL`-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn cart_views(&self, customer_id: Option<CustomerId>) -> Result<Vec<CartView>, StoreError> {
        let rows = sqlx::query_as::<_, CartLineRow>(CART_VIEW_QUERY)
            .bind(customer_id.map(|id| id.as_i32()))
            .fetch_all(&self.pool)
            .await?;
        group_carts(rows)
    }

    async fn order_views(
        &self,
        order_id: Option<OrderId>,
        customer_id: Option<CustomerId>,
    ) -> Result<Vec<OrderView>, StoreError> {
        let rows = sqlx::query_as::<_, OrderLineRow>(ORDER_VIEW_QUERY)
            .bind(order_id.map(|id| id.as_i32()))
            .bind(customer_id.map(|id| id.as_i32()))
            .fetch_all(&self.pool)
            .await?;
        group_orders(rows)
    }

    async fn cart_id_of(&self, customer_id: CustomerId) -> Result<Option<CartId>, StoreError> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT id FROM retail.carts WHERE customer_id = $1")
            .bind(customer_id.as_i32())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| CartId::new(id)))
    }
}

#[async_trait]
impl RetailStore for PgStore {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM retail.products ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM retail.products WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Product::try_from).transpose()
    }

    async fn insert_product(&self, product: &NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO retail.products (name, description, price, stock_quantity, image_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(product.stock_quantity)
        .bind(&product.image_url)
        .fetch_one(&self.pool)
        .await?;
        Product::try_from(row)
    }

    async fn update_product(
        &self,
        id: ProductId,
        product: &NewProduct,
    ) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE retail.products
            SET name = $2, description = $3, price = $4, stock_quantity = $5, image_url = $6
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id.as_i32())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(product.stock_quantity)
        .bind(&product.image_url)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Product::try_from).transpose()
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM retail.products WHERE id = $1")
            .bind(id.as_i32())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let rows = sqlx::query_as::<_, CustomerRow>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM retail.customers ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Customer::try_from).collect()
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM retail.customers WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Customer::try_from).transpose()
    }

    async fn get_customer_by_email(&self, email: &Email) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM retail.customers WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Customer::try_from).transpose()
    }

    async fn insert_customer(&self, customer: &CustomerRecord) -> Result<Customer, StoreError> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            r"
            INSERT INTO retail.customers (name, email, address, phone_number)
            VALUES ($1, $2, $3, $4)
            RETURNING {CUSTOMER_COLUMNS}
            "
        ))
        .bind(&customer.name)
        .bind(customer.email.as_str())
        .bind(&customer.address)
        .bind(&customer.phone_number)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email"))?;
        Customer::try_from(row)
    }

    async fn update_customer(
        &self,
        id: CustomerId,
        update: &CustomerUpdate,
    ) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            r"
            UPDATE retail.customers
            SET name = $2, email = $3, address = $4, phone_number = $5
            WHERE id = $1
            RETURNING {CUSTOMER_COLUMNS}
            "
        ))
        .bind(id.as_i32())
        .bind(&update.name)
        .bind(update.email.as_str())
        .bind(&update.address)
        .bind(&update.phone_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email"))?;
        row.map(Customer::try_from).transpose()
    }

    async fn set_customer_external_id(
        &self,
        id: CustomerId,
        external_id: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE retail.customers SET external_id = $2 WHERE id = $1")
            .bind(id.as_i32())
            .bind(external_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_customer(&self, id: CustomerId) -> Result<DeleteOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<(i32,)> =
            sqlx::query_as("SELECT id FROM retail.customers WHERE id = $1 FOR UPDATE")
                .bind(id.as_i32())
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Ok(DeleteOutcome::NotFound);
        }

        let (has_orders,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM retail.orders WHERE customer_id = $1)")
                .bind(id.as_i32())
                .fetch_one(&mut *tx)
                .await?;
        if has_orders {
            return Ok(DeleteOutcome::InUse);
        }

        // Cart and cart lines cascade.
        sqlx::query("DELETE FROM retail.customers WHERE id = $1")
            .bind(id.as_i32())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn list_carts(&self) -> Result<Vec<CartView>, StoreError> {
        self.cart_views(None).await
    }

    async fn get_cart_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<CartView>, StoreError> {
        Ok(self.cart_views(Some(customer_id)).await?.into_iter().next())
    }

    async fn customers_holding(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<CustomerId>, StoreError> {
        let rows: Vec<(i32,)> = sqlx::query_as(
            r"
            SELECT DISTINCT c.customer_id
            FROM retail.carts c
            JOIN retail.cart_items ci ON ci.cart_id = c.id
            WHERE ci.product_id = $1
            ORDER BY c.customer_id
            ",
        )
        .bind(product_id.as_i32())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| CustomerId::new(id)).collect())
    }

    async fn add_cart_item(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Share-lock both parents so neither can be deleted before commit.
        let customer: Option<(i32,)> =
            sqlx::query_as("SELECT id FROM retail.customers WHERE id = $1 FOR SHARE")
                .bind(customer_id.as_i32())
                .fetch_optional(&mut *tx)
                .await?;
        if customer.is_none() {
            return Ok(CartOutcome::NotFound(CartMiss::Customer));
        }
        let product: Option<(i32,)> =
            sqlx::query_as("SELECT id FROM retail.products WHERE id = $1 FOR SHARE")
                .bind(product_id.as_i32())
                .fetch_optional(&mut *tx)
                .await?;
        if product.is_none() {
            return Ok(CartOutcome::NotFound(CartMiss::Product));
        }

        sqlx::query(
            "INSERT INTO retail.carts (customer_id) VALUES ($1) ON CONFLICT (customer_id) DO NOTHING",
        )
        .bind(customer_id.as_i32())
        .execute(&mut *tx)
        .await?;
        let (cart_id,): (i32,) =
            sqlx::query_as("SELECT id FROM retail.carts WHERE customer_id = $1")
                .bind(customer_id.as_i32())
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r"
            INSERT INTO retail.cart_items (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, product_id)
            DO UPDATE SET quantity = retail.cart_items.quantity + EXCLUDED.quantity
            ",
        )
        .bind(cart_id)
        .bind(product_id.as_i32())
        .bind(quantity.get())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CartOutcome::Applied)
    }

    async fn set_cart_item_quantity(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartOutcome, StoreError> {
        let Some(cart_id) = self.cart_id_of(customer_id).await? else {
            return Ok(CartOutcome::NotFound(CartMiss::Cart));
        };
        let result = sqlx::query(
            "UPDATE retail.cart_items SET quantity = $3 WHERE cart_id = $1 AND product_id = $2",
        )
        .bind(cart_id.as_i32())
        .bind(product_id.as_i32())
        .bind(quantity.get())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(CartOutcome::NotFound(CartMiss::Item));
        }
        Ok(CartOutcome::Applied)
    }

    async fn remove_cart_item(
        &self,
        customer_id: CustomerId,
        cart_item_id: CartItemId,
    ) -> Result<CartOutcome, StoreError> {
        let Some(cart_id) = self.cart_id_of(customer_id).await? else {
            return Ok(CartOutcome::NotFound(CartMiss::Cart));
        };
        let result = sqlx::query("DELETE FROM retail.cart_items WHERE cart_id = $1 AND id = $2")
            .bind(cart_id.as_i32())
            .bind(cart_item_id.as_i32())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(CartOutcome::NotFound(CartMiss::Item));
        }
        Ok(CartOutcome::Applied)
    }

    async fn remove_cart_product(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
    ) -> Result<CartOutcome, StoreError> {
        let Some(cart_id) = self.cart_id_of(customer_id).await? else {
            return Ok(CartOutcome::NotFound(CartMiss::Cart));
        };
        let result =
            sqlx::query("DELETE FROM retail.cart_items WHERE cart_id = $1 AND product_id = $2")
                .bind(cart_id.as_i32())
                .bind(product_id.as_i32())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Ok(CartOutcome::NotFound(CartMiss::Item));
        }
        Ok(CartOutcome::Applied)
    }

    async fn clear_cart(&self, customer_id: CustomerId) -> Result<CartOutcome, StoreError> {
        let Some(cart_id) = self.cart_id_of(customer_id).await? else {
            return Ok(CartOutcome::NotFound(CartMiss::Cart));
        };
        sqlx::query("DELETE FROM retail.cart_items WHERE cart_id = $1")
            .bind(cart_id.as_i32())
            .execute(&self.pool)
            .await?;
        Ok(CartOutcome::Applied)
    }

    async fn list_orders(&self) -> Result<Vec<OrderView>, StoreError> {
        self.order_views(None, None).await
    }

    async fn list_orders_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<OrderView>, StoreError> {
        self.order_views(None, Some(customer_id)).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderView>, StoreError> {
        Ok(self.order_views(Some(id), None).await?.into_iter().next())
    }

    async fn begin_checkout(
        &self,
        customer_id: CustomerId,
    ) -> Result<Box<dyn CheckoutTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCheckout { tx, customer_id }))
    }
}

/// Checkout running inside one database transaction.
///
/// Dropping the value lets sqlx roll the transaction back.
struct PgCheckout {
    tx: Transaction<'static, Postgres>,
    customer_id: CustomerId,
}

#[async_trait]
impl CheckoutTx for PgCheckout {
    async fn lock_cart(&mut self) -> Result<Option<LockedCart>, StoreError> {
        // Concurrent checkouts for the same customer queue on this row lock.
        let cart: Option<(i32,)> =
            sqlx::query_as("SELECT id FROM retail.carts WHERE customer_id = $1 FOR UPDATE")
                .bind(self.customer_id.as_i32())
                .fetch_optional(&mut *self.tx)
                .await?;
        let Some((cart_id,)) = cart else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, LockedLineRow>(
            r"
            SELECT ci.id AS cart_item_id, ci.product_id, p.name AS product_name,
                   p.image_url, p.price AS unit_price, ci.quantity
            FROM retail.cart_items ci
            JOIN retail.products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.id
            FOR UPDATE OF ci
            ",
        )
        .bind(cart_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let lines = rows
            .into_iter()
            .map(LockedLine::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(LockedCart {
            cart_id: CartId::new(cart_id),
            lines,
        }))
    }

    async fn insert_order(&mut self, draft: &OrderDraft) -> Result<PersistedOrder, StoreError> {
        let (order_id,): (i32,) = sqlx::query_as(
            r"
            INSERT INTO retail.orders (customer_id, placed_at, total_amount)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(draft.customer_id.as_i32())
        .bind(draft.placed_at)
        .bind(draft.total_amount.amount())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return StoreError::Conflict(format!(
                    "customer {} does not exist",
                    draft.customer_id
                ));
            }
            StoreError::Database(e)
        })?;

        let mut item_ids = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            let (item_id,): (i32,) = sqlx::query_as(
                r"
                INSERT INTO retail.order_items
                    (order_id, product_id, product_name, image_url, unit_price, quantity, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id
                ",
            )
            .bind(order_id)
            .bind(line.product_id.as_i32())
            .bind(&line.product_name)
            .bind(&line.image_url)
            .bind(line.unit_price.amount())
            .bind(line.quantity.get())
            .bind(line.subtotal.amount())
            .fetch_one(&mut *self.tx)
            .await?;
            item_ids.push(OrderItemId::new(item_id));
        }

        Ok(PersistedOrder {
            order_id: OrderId::new(order_id),
            item_ids,
        })
    }

    async fn drain_cart(
        &mut self,
        cart_id: CartId,
        line_ids: &[CartItemId],
    ) -> Result<(), StoreError> {
        let ids: Vec<i32> = line_ids.iter().map(CartItemId::as_i32).collect();
        let result = sqlx::query("DELETE FROM retail.cart_items WHERE cart_id = $1 AND id = ANY($2)")
            .bind(cart_id.as_i32())
            .bind(&ids)
            .execute(&mut *self.tx)
            .await?;

        let expected = u64::try_from(ids.len()).unwrap_or(u64::MAX);
        if result.rows_affected() != expected {
            return Err(StoreError::Concurrency(format!(
                "drained {} of {expected} cart lines",
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
