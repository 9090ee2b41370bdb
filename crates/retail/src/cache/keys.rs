//! Cache key naming.
//!
//! Keys are flat strings shared by every process that talks to the same
//! cache, so the spelling here is part of the external contract:
//! collection keys (`products`, `customers`, `carts`, `orders`) and
//! per-entity keys (`product:{id}`, `customer:{id}`, `order:{id}`, ...).
//! Nothing outside this module formats a key.

use online_retail_core::{CustomerId, Email, OrderId, ProductId};

/// Every product.
pub const PRODUCTS: &str = "products";
/// Every customer.
pub const CUSTOMERS: &str = "customers";
/// Every cart.
pub const CARTS: &str = "carts";
/// Every order.
pub const ORDERS: &str = "orders";

/// A single product.
#[must_use]
pub fn product(id: ProductId) -> String {
    format!("product:{id}")
}

/// A single customer by id.
#[must_use]
pub fn customer(id: CustomerId) -> String {
    format!("customer:{id}")
}

/// A single customer by email.
#[must_use]
pub fn customer_by_email(email: &Email) -> String {
    format!("customer:email:{email}")
}

/// The cart owned by a customer.
#[must_use]
pub fn cart_of_customer(customer_id: CustomerId) -> String {
    format!("cart:customer:{customer_id}")
}

/// A single order.
#[must_use]
pub fn order(id: OrderId) -> String {
    format!("order:{id}")
}

/// Every order placed by a customer.
#[must_use]
pub fn orders_of_customer(customer_id: CustomerId) -> String {
    format!("orders:customer:{customer_id}")
}

/// Keys that go stale when a customer's cart changes.
#[must_use]
pub fn cart_keys(customer_id: CustomerId) -> [String; 2] {
    [CARTS.to_owned(), cart_of_customer(customer_id)]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_keys() {
        assert_eq!(product(ProductId::new(5)), "product:5");
        assert_eq!(customer(CustomerId::new(6)), "customer:6");
        assert_eq!(order(OrderId::new(7)), "order:7");
    }

    #[test]
    fn test_customer_scoped_keys() {
        let id = CustomerId::new(12);
        assert_eq!(cart_of_customer(id), "cart:customer:12");
        assert_eq!(orders_of_customer(id), "orders:customer:12");
        assert_eq!(cart_keys(id), ["carts".to_owned(), "cart:customer:12".to_owned()]);
    }

    #[test]
    fn test_email_key_uses_normalized_email() {
        let email = Email::parse("Ada@Example.com").unwrap();
        assert_eq!(customer_by_email(&email), "customer:email:ada@example.com");
    }
}
