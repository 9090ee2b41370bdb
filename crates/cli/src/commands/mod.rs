//! Subcommand implementations.

pub mod cart;
pub mod migrate;
pub mod order;
pub mod seed;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use online_retail::config::{ConfigError, RetailConfig};
use online_retail::db::{self, PgStore, StoreError};
use online_retail::services::with_deadline;
use online_retail::{Retail, RetailError};

/// Errors shared by every subcommand.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] StoreError),

    #[error(transparent)]
    Retail(#[from] RetailError),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Connect to `PostgreSQL` and wire the services.
pub async fn connect() -> Result<Retail, CliError> {
    let config = RetailConfig::from_env()?;
    let database = config.require_database()?;

    info!("Connecting to database...");
    let pool = db::create_pool(database).await?;

    Ok(Retail::builder(
        Arc::new(PgStore::new(pool)),
        Arc::new(online_retail::cache::MokaCacheStore::new(config.cache.capacity)),
        config.cache.ttls,
    )
    .operation_timeout(config.operation_timeout)
    .build())
}

/// Apply the configured deadline, if any.
pub async fn bounded<T, F>(retail: &Retail, operation: F) -> Result<T, CliError>
where
    F: Future<Output = Result<T, RetailError>>,
{
    let result = match retail.operation_timeout() {
        Some(deadline) => with_deadline(deadline, operation).await,
        None => operation.await,
    };
    Ok(result?)
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{rendered}");
    }
    Ok(())
}
