//! Online retail cart-to-order pipeline.
//!
//! Customers accumulate a cart, then convert it into an immutable order
//! whose lines carry the prices read at placement time. Read models are
//! served cache-aside; every write invalidates the keys it made stale
//! after the write commits.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use online_retail::config::CacheConfig;
//! use online_retail::db::MemoryStore;
//! use online_retail::Retail;
//!
//! # async fn demo() -> Result<(), online_retail::RetailError> {
//! let retail = Retail::with_moka(Arc::new(MemoryStore::new()), &CacheConfig::default());
//! let products = retail.catalog().get_all().await?;
//! # let _ = products;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

pub use error::RetailError;
pub use state::{Retail, RetailBuilder};
