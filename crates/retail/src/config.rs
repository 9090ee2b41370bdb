//! Pipeline configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required for the `PostgreSQL` backend
//! - `RETAIL_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `RETAIL_DB_MAX_CONNECTIONS` - Pool size ceiling (default: 10)
//! - `RETAIL_DB_MIN_CONNECTIONS` - Idle connections kept open (default: 2)
//! - `RETAIL_DB_ACQUIRE_TIMEOUT_SECS` - Pool checkout timeout (default: 10)
//! - `RETAIL_CACHE_CAPACITY` - Maximum cached entries (default: 10000)
//! - `RETAIL_CACHE_TTL_PRODUCTS_SECS` - Product read-model TTL (default: 300)
//! - `RETAIL_CACHE_TTL_CUSTOMERS_SECS` - Customer read-model TTL (default: 300)
//! - `RETAIL_CACHE_TTL_CARTS_SECS` - Cart read-model TTL (default: 300)
//! - `RETAIL_CACHE_TTL_ORDERS_SECS` - Order read-model TTL (default: 60)
//! - `RETAIL_OPERATION_TIMEOUT_SECS` - Deadline for each pipeline call

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct RetailConfig {
    /// Connection settings, present when a database URL is set.
    pub database: Option<DatabaseConfig>,
    pub cache: CacheConfig,
    /// Deadline applied to each pipeline call, if any.
    pub operation_timeout: Option<Duration>,
}

/// `PostgreSQL` pool settings.
///
/// Implements `Debug` manually to redact the URL.
#[derive(Clone)]
pub struct DatabaseConfig {
    /// Connection URL (contains password)
    pub url: SecretString,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

/// Read-model cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries held at once.
    pub capacity: u64,
    pub ttls: CacheTtls,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttls: CacheTtls::default(),
        }
    }
}

/// Time-to-live per read-model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub products: Duration,
    pub customers: Duration,
    pub carts: Duration,
    pub orders: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            products: Duration::from_secs(300),
            customers: Duration::from_secs(300),
            carts: Duration::from_secs(300),
            orders: Duration::from_secs(60),
        }
    }
}

impl RetailConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let database = env
            .get("RETAIL_DATABASE_URL")
            .or_else(|| env.get("DATABASE_URL"))
            .map(|url| -> Result<DatabaseConfig, ConfigError> {
                Ok(DatabaseConfig {
                    url: SecretString::from(url),
                    max_connections: env.parse_or("RETAIL_DB_MAX_CONNECTIONS", 10)?,
                    min_connections: env.parse_or("RETAIL_DB_MIN_CONNECTIONS", 2)?,
                    acquire_timeout_secs: env.parse_or("RETAIL_DB_ACQUIRE_TIMEOUT_SECS", 10)?,
                })
            })
            .transpose()?;

        let defaults = CacheTtls::default();
        let cache = CacheConfig {
            capacity: env.parse_or("RETAIL_CACHE_CAPACITY", 10_000)?,
            ttls: CacheTtls {
                products: env.secs_or("RETAIL_CACHE_TTL_PRODUCTS_SECS", defaults.products)?,
                customers: env.secs_or("RETAIL_CACHE_TTL_CUSTOMERS_SECS", defaults.customers)?,
                carts: env.secs_or("RETAIL_CACHE_TTL_CARTS_SECS", defaults.carts)?,
                orders: env.secs_or("RETAIL_CACHE_TTL_ORDERS_SECS", defaults.orders)?,
            },
        };

        let operation_timeout = env
            .parse::<u64>("RETAIL_OPERATION_TIMEOUT_SECS")?
            .map(Duration::from_secs);

        Ok(Self {
            database,
            cache,
            operation_timeout,
        })
    }

    /// The database settings, or an error naming the missing variable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when no database URL was set.
    pub fn require_database(&self) -> Result<&DatabaseConfig, ConfigError> {
        self.database
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("RETAIL_DATABASE_URL".to_string()))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable; blank values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
            })
            .transpose()
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    fn secs_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self
            .parse::<u64>(key)?
            .map_or(default, Duration::from_secs))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<RetailConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RetailConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert!(config.database.is_none());
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.cache.ttls.orders, Duration::from_secs(60));
        assert!(config.operation_timeout.is_none());
        assert!(matches!(
            config.require_database(),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_database_url_fallback() {
        let config = load(&[("DATABASE_URL", "postgres://fallback")]).unwrap();
        let db = config.require_database().unwrap();
        assert_eq!(db.url.expose_secret(), "postgres://fallback");
        assert_eq!(db.max_connections, 10);
        assert_eq!(db.min_connections, 2);

        let config = load(&[
            ("RETAIL_DATABASE_URL", "postgres://primary"),
            ("DATABASE_URL", "postgres://fallback"),
        ])
        .unwrap();
        assert_eq!(
            config.require_database().unwrap().url.expose_secret(),
            "postgres://primary"
        );
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("RETAIL_CACHE_CAPACITY", "50"),
            ("RETAIL_CACHE_TTL_CARTS_SECS", "5"),
            ("RETAIL_OPERATION_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.cache.ttls.carts, Duration::from_secs(5));
        assert_eq!(config.cache.ttls.products, Duration::from_secs(300));
        assert_eq!(config.operation_timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_invalid_number() {
        let err = load(&[("RETAIL_CACHE_CAPACITY", "lots")]).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "RETAIL_CACHE_CAPACITY")
        );
    }

    #[test]
    fn test_debug_redacts_url() {
        let config = load(&[("RETAIL_DATABASE_URL", "postgres://user:hunter2@db")]).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
