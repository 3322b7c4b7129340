//! Error types for the Weir rate limiter.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Weir operations.
///
/// Validation failures are individual variants carrying the offending
/// values, so callers can match on the kind instead of comparing sentinel
/// values or message strings.
#[derive(Error, Debug)]
pub enum WeirError {
    /// Rate limit key is empty after trimming surrounding whitespace
    #[error("key cannot be empty")]
    EmptyKey,

    /// Requested count is zero or negative
    #[error("count must be greater than zero")]
    ZeroCount,

    /// Requested limit is zero or negative
    #[error("limit must be greater than zero")]
    ZeroLimit,

    /// A single request asks for more than the whole window allows
    #[error("count {count} exceeds limit {limit}")]
    CountExceedsLimit { count: i64, limit: i64 },

    /// Window duration is zero
    #[error("window duration cannot be zero")]
    ZeroWindow,

    /// The bucket cannot absorb the requested count within this window.
    ///
    /// `usage` is the ceiling of the usage last persisted for the key,
    /// before any decay adjustment.
    #[error("limit reached (usage {usage})")]
    LimitReached { usage: i64 },

    /// No bucket is currently stored for the key
    #[error("no bucket stored for key")]
    NotFound,

    /// The limiter worker is not running
    #[error("rate limiter is not running")]
    NotRunning,

    /// `start` was called while the worker is already running
    #[error("rate limiter is already running")]
    AlreadyRunning,

    /// Configuration-related errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Store/transport failure, propagated verbatim
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A persisted bucket could not be encoded or decoded
    #[error("bucket encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Weir operations.
pub type Result<T> = std::result::Result<T, WeirError>;
