//! Online Retail Core - Shared domain types.
//!
//! This crate provides the value types used by every layer of the order
//! pipeline:
//! - `online-retail` - Catalog, customers, carts, order placement, caching
//! - `online-retail-cli` - Migrations, seeding and operator commands
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access and no
//! cache clients. With the `postgres` feature enabled every type can be
//! bound to and decoded from `sqlx` queries directly.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, emails, prices and quantities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
