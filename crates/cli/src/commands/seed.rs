//! Seed the catalog and customer directory from a YAML file.
//!
//! ```yaml
//! products:
//!   - name: Desk Lamp
//!     description: Brass, adjustable
//!     price: "24.50"
//!     stock_quantity: 12
//!     image_url: /img/lamp.png
//! customers:
//!   - name: Ada Lovelace
//!     email: ada@example.com
//!     address: 12 St James's Square
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use online_retail::RetailError;
use online_retail::db::StoreError;
use online_retail::models::{NewCustomer, NewProduct};
use online_retail_core::Email;

use super::{CliError, bounded, connect};

/// Errors specific to loading a seed file.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Could not read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error(transparent)]
    Cli(#[from] CliError),
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    products: Vec<NewProduct>,
    #[serde(default)]
    customers: Vec<SeedCustomer>,
}

#[derive(Debug, Deserialize)]
struct SeedCustomer {
    name: String,
    email: Email,
    address: Option<String>,
    phone_number: Option<String>,
}

/// Insert every product and customer in `file_path`.
///
/// Customers whose email is already registered are skipped.
pub async fn run(file_path: &str) -> Result<(), SeedError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(SeedError::NotFound(file_path.to_owned()));
    }

    info!(path = %file_path, "Loading seed data from file");
    let content = tokio::fs::read_to_string(path).await?;
    let seed: SeedFile = serde_yaml::from_str(&content)?;
    info!(
        products = seed.products.len(),
        customers = seed.customers.len(),
        "Parsed seed file"
    );

    let retail = connect().await?;

    for product in &seed.products {
        let created = bounded(&retail, retail.catalog().add(product)).await?;
        info!(product_id = %created.id, name = %created.name, "Product added");
    }

    for customer in seed.customers {
        let email = customer.email.clone();
        let added = bounded(
            &retail,
            retail.customers().add(NewCustomer {
                name: customer.name,
                email: customer.email,
                address: customer.address,
                phone_number: customer.phone_number,
                password: None,
            }),
        )
        .await;
        match added {
            Ok(created) => info!(customer_id = %created.id, %email, "Customer added"),
            Err(CliError::Retail(RetailError::Store(StoreError::Conflict(_)))) => {
                warn!(%email, "Customer already exists, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("Seeding complete!");
    Ok(())
}
