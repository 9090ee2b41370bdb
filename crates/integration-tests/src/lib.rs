//! Integration tests for the online retail pipeline.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory backend only
//! cargo test -p online-retail-integration-tests
//!
//! # Include the PostgreSQL variants
//! RETAIL_TEST_DATABASE_URL=postgres://localhost/retail_test \
//!     cargo test -p online-retail-integration-tests -- --include-ignored
//! ```
//!
//! Every property test runs against [`TestContext::memory`]; the same body
//! runs against [`TestContext::postgres`] in an ignored variant. Postgres
//! tests share one database, so fixtures use unique emails and assertions
//! stay scoped to the customers a test created.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use rust_decimal::Decimal;
use secrecy::SecretString;

use online_retail::config::{CacheConfig, DatabaseConfig};
use online_retail::db::{self, MemoryStore, PgStore, RetailStore};
use online_retail::models::{Customer, NewCustomer, NewProduct, Product};
use online_retail::{Retail, RetailError};
use online_retail_core::{Email, Price};

/// Error type for fixture setup.
pub type SetupError = Box<dyn std::error::Error + Send + Sync>;

/// Services plus direct access to the store behind them.
pub struct TestContext {
    pub retail: Retail,
    pub store: Arc<dyn RetailStore>,
    memory: Option<MemoryStore>,
}

impl TestContext {
    /// Services over a fresh [`MemoryStore`] and moka cache.
    #[must_use]
    pub fn memory() -> Self {
        let memory = MemoryStore::new();
        let store: Arc<dyn RetailStore> = Arc::new(memory.clone());
        Self {
            retail: Retail::with_moka(Arc::clone(&store), &CacheConfig::default()),
            store,
            memory: Some(memory),
        }
    }

    /// Services over `PostgreSQL` at `RETAIL_TEST_DATABASE_URL`, migrated.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or the database is
    /// unreachable.
    pub async fn postgres() -> Result<Self, SetupError> {
        let url = std::env::var("RETAIL_TEST_DATABASE_URL")
            .map_err(|_| "RETAIL_TEST_DATABASE_URL not set")?;
        let pool = db::create_pool(&DatabaseConfig {
            url: SecretString::from(url),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
        })
        .await?;
        db::migrate(&pool).await?;

        let store: Arc<dyn RetailStore> = Arc::new(PgStore::new(pool));
        Ok(Self {
            retail: Retail::with_moka(Arc::clone(&store), &CacheConfig::default()),
            store,
            memory: None,
        })
    }

    /// The in-memory backend, for fault injection.
    #[must_use]
    pub const fn memory_store(&self) -> Option<&MemoryStore> {
        self.memory.as_ref()
    }

    /// Register a customer with a unique email.
    ///
    /// # Errors
    ///
    /// Returns the service error if registration fails.
    pub async fn customer(&self, name: &str) -> Result<Customer, RetailError> {
        let email = Email::parse(&unique_email(name)).map_err(|e| {
            RetailError::Store(db::StoreError::DataCorruption(format!("fixture email: {e}")))
        })?;
        self.retail
            .customers()
            .add(NewCustomer {
                name: name.to_owned(),
                email,
                address: None,
                phone_number: None,
                password: None,
            })
            .await
    }

    /// Create a product at `price`.
    ///
    /// # Errors
    ///
    /// Returns the service error if the insert fails.
    pub async fn product(&self, name: &str, price: Decimal) -> Result<Product, RetailError> {
        let price = Price::new(price).map_err(|e| {
            RetailError::Store(db::StoreError::DataCorruption(format!("fixture price: {e}")))
        })?;
        self.retail
            .catalog()
            .add(&NewProduct {
                name: name.to_owned(),
                description: None,
                price,
                stock_quantity: 100,
                image_url: format!("/img/{}.png", name.to_lowercase()),
            })
            .await
    }
}

/// An email address no other fixture in this database has used.
#[must_use]
pub fn unique_email(prefix: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let stamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let local: String = prefix
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase();
    format!("{local}.{stamp}.{n}@test.example")
}

/// Generate an in-memory test and an ignored `PostgreSQL` test from one
/// `async fn(&TestContext)` body.
#[macro_export]
macro_rules! backend_tests {
    ($($name:ident),+ $(,)?) => {
        mod memory {
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $name() {
                    super::$name(&$crate::TestContext::memory()).await;
                }
            )+
        }

        mod postgres {
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                #[ignore = "Requires PostgreSQL"]
                async fn $name() {
                    let ctx = $crate::TestContext::postgres()
                        .await
                        .expect("RETAIL_TEST_DATABASE_URL must point at a reachable database");
                    super::$name(&ctx).await;
                }
            )+
        }
    };
}
