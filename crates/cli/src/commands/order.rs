//! Order commands.

use online_retail::models::PlaceOrderOutcome;
use online_retail_core::{CustomerId, OrderId};

use super::{CliError, bounded, connect, print_json};

/// Place an order from the customer's cart and print it.
pub async fn place(customer: CustomerId) -> Result<(), CliError> {
    let retail = connect().await?;
    match bounded(&retail, retail.orders().place_order(customer)).await? {
        PlaceOrderOutcome::Placed(order) => print_json(&order),
        PlaceOrderOutcome::CustomerNotFound => {
            Err(CliError::NotFound(format!("customer {customer}")))
        }
        PlaceOrderOutcome::CartEmpty => Err(CliError::NotFound(format!(
            "items in the cart of customer {customer}"
        ))),
    }
}

/// Print an order.
pub async fn show(order: OrderId) -> Result<(), CliError> {
    let retail = connect().await?;
    let view = bounded(&retail, retail.orders().get_by_id(order))
        .await?
        .ok_or_else(|| CliError::NotFound(format!("order {order}")))?;
    print_json(&view)
}
