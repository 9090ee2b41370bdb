//! Service layer: cache-aside accessors and the order placement engine.
//!
//! Every service reads through [`CacheAside`](crate::cache::CacheAside) and
//! writes to the [`RetailStore`](crate::db::RetailStore) first, invalidating
//! the affected keys only after the write has committed.

mod carts;
mod catalog;
mod customers;
mod orders;

use std::future::Future;
use std::time::Duration;

pub use carts::CartManager;
pub use catalog::ProductCatalog;
pub use customers::{CustomerDirectory, IdentityError, IdentityProfile, IdentityProvisioner};
pub use orders::OrderService;

use crate::error::RetailError;

/// Run `operation` with a deadline.
///
/// On expiry the future is dropped, which rolls back any unit of work it
/// still holds open.
///
/// # Errors
///
/// Returns [`RetailError::Timeout`] if the deadline passes first, otherwise
/// whatever `operation` returns.
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> Result<T, RetailError>
where
    F: Future<Output = Result<T, RetailError>>,
{
    tokio::time::timeout(deadline, operation)
        .await
        .map_err(|_| RetailError::Timeout(deadline))?
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let value = with_deadline(Duration::from_secs(1), async { Ok::<_, RetailError>(7) }).await;
        assert!(matches!(value, Ok(7)));
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let result = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RetailError>(())
        })
        .await;
        assert!(matches!(result, Err(RetailError::Timeout(_))));
    }
}
