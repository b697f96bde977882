//! Counter store trait for abstracting in-memory and Redis implementations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a counter store.
///
/// Any of these means the increment may not have committed; callers must
/// not treat it as either an admission or a denial.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the transaction did not commit.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// The round trip exceeded the configured timeout.
    #[error("counter store timed out after {0:?}")]
    Timeout(Duration),
}

/// A shared store of expiring integer counters.
///
/// Implementations must make `increment_and_expire` linearizable per key:
/// no two concurrent callers may observe the same resulting count.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter at `key` (creating it at 1 if absent
    /// or expired) and set its absolute expiry to `expire_at` epoch seconds.
    ///
    /// Both effects commit together or not at all. Returns the new count.
    async fn increment_and_expire(&self, key: &str, expire_at: u64) -> Result<u64, StoreError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl<S: CounterStore + ?Sized> CounterStore for Arc<S> {
    async fn increment_and_expire(&self, key: &str, expire_at: u64) -> Result<u64, StoreError> {
        (**self).increment_and_expire(key, expire_at).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }
}
