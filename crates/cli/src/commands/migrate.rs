//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! retail-cli migrate
//! ```
//!
//! Migrations live in `crates/retail/migrations/` and create the `retail`
//! schema.

use tracing::info;

use online_retail::config::RetailConfig;
use online_retail::db;

use super::CliError;

/// Run every pending migration.
pub async fn run() -> Result<(), CliError> {
    let config = RetailConfig::from_env()?;
    let database = config.require_database()?;

    info!("Connecting to database...");
    let pool = db::create_pool(database).await?;

    info!("Running migrations...");
    db::migrate(&pool).await?;

    info!("Migrations complete!");
    Ok(())
}
