//! Errors surfaced by the pipeline services.

use std::time::Duration;

use thiserror::Error;

use online_retail_core::PriceError;

use crate::db::StoreError;
use crate::services::IdentityError;

/// Errors returned by service operations.
///
/// Missing rows are not errors; they are reported through `Option` or an
/// outcome enum. Cache failures never reach this type.
#[derive(Debug, Error)]
pub enum RetailError {
    /// The source of truth failed; any unit of work was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A quantity outside the accepted range for the operation.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(i32),

    /// A subtotal or order total falls outside the storable range; nothing
    /// was written.
    #[error("order amount out of range: {0}")]
    Amount(#[from] PriceError),

    /// The identity provider rejected or failed a provisioning call.
    #[error("identity provisioning failed: {0}")]
    Identity(#[from] IdentityError),

    /// The caller's deadline expired before the operation finished.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl RetailError {
    /// Whether retrying the same call could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Store(StoreError::Concurrency(_) | StoreError::Database(_))
        )
    }
}
