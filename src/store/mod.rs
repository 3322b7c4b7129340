//! Shared key-value storage for persisted bucket state.
//!
//! The limiter worker talks to storage exclusively through the [`Store`]
//! trait, so production deployments can share a Redis instance while tests
//! and single-process embedders run against [`MemoryStore`].

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to establish or maintain a connection
    #[error("connection error: {0}")]
    Connection(String),

    /// A read, write, or delete against the store failed
    #[error("operation failed: {0}")]
    Operation(String),
}

/// Capability consumed by the limiter worker.
///
/// Absence of a key is a regular outcome (`Ok(None)` on reads), distinct
/// from transport failures.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Read the raw value stored for a key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a value with a time-to-live, after which the key expires.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Remove a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
