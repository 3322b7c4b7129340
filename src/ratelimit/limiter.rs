//! Public limiter facade.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::WeirConfig;
use crate::error::{Result, WeirError};
use crate::store::{MemoryStore, RedisStore, Store};

use super::worker::{LimiterWorker, WorkerClient};

/// Distributed-safe leaky bucket rate limiter.
///
/// One instance owns one worker task; operations for all keys serialize
/// through it, so callers in the same process can never race each other on
/// a key. Multiple instances may share the same store, in which case their
/// read-modify-write cycles can interleave: the store is the unit of
/// durability, not of atomicity, and a burst split across instances can
/// transiently exceed the limit (last write wins).
pub struct Ratelimit<S: Store> {
    limit: i64,
    window: Duration,
    store: Arc<S>,
    worker: Option<RunningWorker>,
}

struct RunningWorker {
    client: WorkerClient,
    handle: JoinHandle<()>,
}

impl Ratelimit<RedisStore> {
    /// Connect to Redis and build a limiter from configuration.
    pub async fn connect(config: &WeirConfig) -> Result<Self> {
        let store = RedisStore::connect(&config.store).await?;
        Ok(Self::with_store(
            store,
            config.limiter.limit,
            config.limiter.window(),
        ))
    }
}

impl Ratelimit<MemoryStore> {
    /// Build a limiter over a process-local store.
    pub fn in_memory(limit: i64, window: Duration) -> Self {
        Self::with_store(MemoryStore::new(), limit, window)
    }
}

impl<S: Store> Ratelimit<S> {
    /// Build a limiter over an existing store.
    pub fn with_store(store: S, limit: i64, window: Duration) -> Self {
        Self {
            limit,
            window,
            store: Arc::new(store),
            worker: None,
        }
    }

    /// Spawn the worker task.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(WeirError::AlreadyRunning);
        }
        let (client, handle) = LimiterWorker::spawn(self.store.clone());
        self.worker = Some(RunningWorker { client, handle });
        info!(limit = self.limit, window = ?self.window, "Rate limiter started");
        Ok(())
    }

    /// Stop the worker.
    ///
    /// Commands already queued are drained first; the call returns once the
    /// worker task has terminated. Subsequent operations fail with
    /// [`WeirError::NotRunning`], and `start` may be called again.
    pub async fn stop(&mut self) -> Result<()> {
        let RunningWorker { client, handle } = self.worker.take().ok_or(WeirError::NotRunning)?;
        drop(client);
        if let Err(e) = handle.await {
            error!(error = %e, "Limiter worker task failed");
        }
        info!("Rate limiter stopped");
        Ok(())
    }

    /// Consume one unit of quota for `key` using the configured limit and
    /// window, returning the new usage count.
    pub async fn incr(&self, key: &str) -> Result<i64> {
        self.post(key, 1, self.limit, self.window).await
    }

    /// Consume `count` units of quota for `key` with explicit parameters.
    ///
    /// A stored bucket whose parameters differ from `limit`/`window` is
    /// discarded and recreated empty, so policy changes take effect without
    /// manual deletion at the cost of resetting accumulated usage.
    pub async fn post(&self, key: &str, count: i64, limit: i64, window: Duration) -> Result<i64> {
        check_post_args(key, count, limit, window)?;
        self.client()?.post(key.to_string(), count, limit, window).await
    }

    /// Current usage count for `key`.
    ///
    /// Reports [`WeirError::NotFound`] when no bucket is stored, which is
    /// distinct from a stored bucket that has decayed to zero.
    pub async fn get(&self, key: &str) -> Result<i64> {
        check_key(key)?;
        self.client()?.get(key.to_string()).await
    }

    /// Remove the stored bucket for `key`. Absent keys delete cleanly.
    pub async fn delete(&self, key: &str) -> Result<()> {
        check_key(key)?;
        self.client()?.delete(key.to_string()).await
    }

    /// Remove the stored bucket for `key`, then stop the worker.
    pub async fn kill(&mut self, key: &str) -> Result<()> {
        self.delete(key).await?;
        self.stop().await
    }

    fn client(&self) -> Result<&WorkerClient> {
        self.worker
            .as_ref()
            .map(|worker| &worker.client)
            .ok_or(WeirError::NotRunning)
    }
}

/// Validate POST-equivalent arguments before anything reaches the worker.
fn check_post_args(key: &str, count: i64, limit: i64, window: Duration) -> Result<()> {
    check_key(key)?;
    if count <= 0 {
        return Err(WeirError::ZeroCount);
    }
    if limit <= 0 {
        return Err(WeirError::ZeroLimit);
    }
    if count > limit {
        return Err(WeirError::CountExceedsLimit { count, limit });
    }
    if window.is_zero() {
        return Err(WeirError::ZeroWindow);
    }
    Ok(())
}

fn check_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(WeirError::EmptyKey);
    }
    Ok(())
}
