//! Cart commands.

use tracing::info;

use online_retail::models::CartOutcome;
use online_retail_core::{CustomerId, ProductId};

use super::{CliError, bounded, connect, print_json};

/// Add a product to a customer's cart, then print the cart.
pub async fn add(customer: CustomerId, product: ProductId, quantity: i32) -> Result<(), CliError> {
    let retail = connect().await?;
    let outcome = bounded(&retail, retail.carts().add_item(customer, product, quantity)).await?;
    if let CartOutcome::NotFound(miss) = outcome {
        return Err(CliError::NotFound(format!("{miss:?}")));
    }
    info!(%customer, %product, quantity, "Item added");
    show(customer).await
}

/// Print a customer's cart.
pub async fn show(customer: CustomerId) -> Result<(), CliError> {
    let retail = connect().await?;
    let cart = bounded(&retail, retail.carts().get_by_customer(customer))
        .await?
        .ok_or_else(|| CliError::NotFound(format!("cart for customer {customer}")))?;
    print_json(&cart)
}

/// Empty a customer's cart.
pub async fn clear(customer: CustomerId) -> Result<(), CliError> {
    let retail = connect().await?;
    match bounded(&retail, retail.carts().clear(customer)).await? {
        CartOutcome::Applied => {
            info!(%customer, "Cart cleared");
            Ok(())
        }
        CartOutcome::NotFound(miss) => Err(CliError::NotFound(format!("{miss:?}"))),
    }
}
