//! The serialization worker: one task owning all store access.
//!
//! Every public operation becomes a [`Command`] queued to a single worker
//! task, so overlapping callers within one process can never interleave a
//! read and a write for the same key. The command channel doubles as the
//! stop signal: when the facade drops its [`WorkerClient`], the worker
//! drains whatever is already queued and the loop terminates.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Result, WeirError};
use crate::store::Store;

use super::bucket::{usage_count, TokenBucket};

/// Depth of the command queue feeding the worker.
const COMMAND_QUEUE_DEPTH: usize = 64;

type Reply<T> = oneshot::Sender<Result<T>>;

/// One queued operation, carrying exactly the fields it needs plus the
/// oneshot slot its reply goes to.
pub(crate) enum Command {
    Get {
        key: String,
        reply: Reply<i64>,
    },
    Post {
        key: String,
        count: i64,
        limit: i64,
        window: Duration,
        reply: Reply<i64>,
    },
    Delete {
        key: String,
        reply: Reply<()>,
    },
}

/// Sending half of the command queue, held by the facade.
///
/// Dropping the last clone closes the queue, which stops the worker.
#[derive(Clone)]
pub(crate) struct WorkerClient {
    tx: mpsc::Sender<Command>,
}

impl WorkerClient {
    pub(crate) async fn get(&self, key: String) -> Result<i64> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Get { key, reply }, rx).await
    }

    pub(crate) async fn post(
        &self,
        key: String,
        count: i64,
        limit: i64,
        window: Duration,
    ) -> Result<i64> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Post {
                key,
                count,
                limit,
                window,
                reply,
            },
            rx,
        )
        .await
    }

    pub(crate) async fn delete(&self, key: String) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Delete { key, reply }, rx).await
    }

    async fn send<T>(&self, command: Command, rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        self.tx
            .send(command)
            .await
            .map_err(|_| WeirError::NotRunning)?;
        rx.await.map_err(|_| WeirError::NotRunning)?
    }
}

/// The worker task: the store handle plus the receive side of the queue.
pub(crate) struct LimiterWorker<S: Store> {
    store: Arc<S>,
    rx: mpsc::Receiver<Command>,
}

impl<S: Store> LimiterWorker<S> {
    /// Spawn a worker task over the given store.
    pub(crate) fn spawn(store: Arc<S>) -> (WorkerClient, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let worker = LimiterWorker { store, rx };
        let handle = tokio::spawn(worker.run());
        (WorkerClient { tx }, handle)
    }

    /// Receive and dispatch commands, one at a time, until the channel
    /// closes.
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.dispatch(command).await;
        }
        debug!("Limiter worker stopped");
    }

    async fn dispatch(&self, command: Command) {
        match command {
            Command::Get { key, reply } => {
                let result = self.handle_get(&key).await;
                let _ = reply.send(result);
            }
            Command::Post {
                key,
                count,
                limit,
                window,
                reply,
            } => {
                let result = self.handle_post(&key, count, limit, window).await;
                let _ = reply.send(result);
            }
            Command::Delete { key, reply } => {
                let result = self.handle_delete(&key).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_get(&self, key: &str) -> Result<i64> {
        trace!(key = %key, "GET");
        match self.load_bucket(key).await? {
            Some(bucket) => Ok(usage_count(bucket.adjusted_usage(Utc::now()))),
            None => Err(WeirError::NotFound),
        }
    }

    async fn handle_post(&self, key: &str, count: i64, limit: i64, window: Duration) -> Result<i64> {
        trace!(key = %key, count = count, limit = limit, "POST");
        let now = Utc::now();
        let limit_quota = limit as f64;

        let mut bucket = match self.load_bucket(key).await? {
            Some(stored) if stored.limit() == limit_quota && stored.window() == window => stored,
            Some(stored) => {
                debug!(
                    key = %key,
                    stored_limit = stored.limit(),
                    stored_window = ?stored.window(),
                    limit = limit,
                    window = ?window,
                    "Bucket parameters changed, recreating"
                );
                TokenBucket::new(limit_quota, window, now)
            }
            None => {
                debug!(key = %key, limit = limit, window = ?window, "Creating bucket");
                TokenBucket::new(limit_quota, window, now)
            }
        };

        if !bucket.consume(count as f64, now) {
            // Report the usage as last persisted, not the decayed value.
            debug!(key = %key, usage = bucket.used(), "Limit reached");
            return Err(WeirError::LimitReached {
                usage: usage_count(bucket.used()),
            });
        }

        self.store
            .set_with_expiry(key, &bucket.encode()?, window)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Failed to persist bucket");
                WeirError::Store(e)
            })?;

        Ok(usage_count(bucket.used()))
    }

    async fn handle_delete(&self, key: &str) -> Result<()> {
        trace!(key = %key, "DELETE");
        self.store.delete(key).await?;
        Ok(())
    }

    async fn load_bucket(&self, key: &str) -> Result<Option<TokenBucket>> {
        match self.store.get(key).await? {
            Some(data) => Ok(Some(TokenBucket::decode(&data)?)),
            None => Ok(None),
        }
    }
}
