//! Redis store implementation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::info;

use crate::config::StoreConfig;

use super::{Store, StoreError};

/// Redis-backed store.
///
/// Holds `pool_size` multiplexed connections and rotates between them per
/// operation. Every key is namespaced with the configured prefix so that
/// distinct limiter deployments sharing one Redis do not collide.
pub struct RedisStore {
    connections: Vec<ConnectionManager>,
    next: AtomicUsize,
    key_prefix: String,
}

impl RedisStore {
    /// Connect to Redis with the given configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| StoreError::Connection(e.to_string()))?;

        let pool_size = config.pool_size.max(1);
        let mut connections = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            // Use a timeout to prevent hanging if Redis is unreachable
            let conn = tokio::time::timeout(
                config.connect_timeout(),
                ConnectionManager::new(client.clone()),
            )
            .await
            .map_err(|_| StoreError::Connection("connection timed out".to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;
            connections.push(conn);
        }

        info!(
            url = %config.url,
            pool_size = pool_size,
            key_prefix = %config.key_prefix,
            "Connected to Redis store"
        );

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn connection(&self) -> ConnectionManager {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[index].clone()
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection();
        conn.get::<_, Option<Vec<u8>>>(self.namespaced(key))
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection();
        // PSETEX so sub-second windows keep a meaningful expiry.
        let ttl_ms = ttl.as_millis().max(1) as u64;
        conn.pset_ex::<_, _, ()>(self.namespaced(key), value, ttl_ms)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection();
        conn.del::<_, ()>(self.namespaced(key))
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))
    }
}
