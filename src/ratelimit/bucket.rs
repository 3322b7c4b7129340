//! Token bucket state and decay math.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// Per-key record of consumed quota and window parameters.
///
/// This is the exact form persisted to the store; all four fields must
/// round-trip so decay keeps computing correctly across restarts. Usage
/// leaks back at a constant `limit / window` rate, so a bucket left alone
/// for one full window is empty again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBucket {
    /// Quota consumed as of `last_access`
    used: f64,
    /// Wall-clock time of the last successful consumption
    last_access: DateTime<Utc>,
    /// Maximum usage per window
    limit: f64,
    /// Window length
    window: Duration,
}

impl TokenBucket {
    /// Create an empty bucket for the given quota policy.
    pub fn new(limit: f64, window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            used: 0.0,
            last_access: now,
            limit,
            window,
        }
    }

    /// Usage decayed linearly toward zero since the last access.
    ///
    /// A `last_access` at or before the Unix epoch marks a bucket that has
    /// never been consumed from; no decay applies. The result is clamped at
    /// zero but deliberately not capped at `limit`.
    pub fn adjusted_usage(&self, now: DateTime<Utc>) -> f64 {
        let mut used = self.used;
        if self.last_access.timestamp() > 0 {
            let elapsed = seconds_between(self.last_access, now);
            used -= self.limit * elapsed / self.window.as_secs_f64();
            if used < 0.0 {
                used = 0.0;
            }
        }
        used
    }

    /// Try to consume `count` units of quota at `now`.
    ///
    /// Returns `true` and records the consumption if the decayed usage plus
    /// `count` stays within the limit; otherwise leaves the bucket untouched
    /// and returns `false`.
    pub fn consume(&mut self, count: f64, now: DateTime<Utc>) -> bool {
        let used = self.adjusted_usage(now);
        if used + count <= self.limit {
            self.used = used + count;
            self.last_access = now;
            return true;
        }
        false
    }

    /// Raw usage as of the last successful consumption, without decay.
    pub fn used(&self) -> f64 {
        self.used
    }

    /// The limit this bucket was created with.
    pub fn limit(&self) -> f64 {
        self.limit
    }

    /// The window this bucket was created with.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Serialize to the form persisted in the store.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Reconstruct a bucket from its persisted form.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Round a raw usage value up to the externally visible integer count.
pub(crate) fn usage_count(value: f64) -> i64 {
    value.ceil() as i64
}

fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let elapsed = later.signed_duration_since(earlier);
    elapsed
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or_else(|| elapsed.num_milliseconds() as f64 / 1_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn bucket_with_usage(used: f64, limit: f64, window: Duration, at: DateTime<Utc>) -> TokenBucket {
        let mut bucket = TokenBucket::new(limit, window, at);
        bucket.used = used;
        bucket
    }

    #[test]
    fn test_new_bucket_is_empty() {
        let now = Utc::now();
        let bucket = TokenBucket::new(10.0, Duration::from_secs(10), now);
        assert_eq!(bucket.adjusted_usage(now), 0.0);
    }

    #[test]
    fn test_usage_decays_linearly() {
        let start = Utc::now();
        let bucket = bucket_with_usage(5.0, 10.0, Duration::from_secs(10), start);

        // Leak rate is 1 unit/s: after 2.5s, 2.5 units remain.
        let usage = bucket.adjusted_usage(start + TimeDelta::milliseconds(2_500));
        assert!((usage - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_usage_decays_to_zero_at_half_window() {
        let start = Utc::now();
        let bucket = bucket_with_usage(5.0, 10.0, Duration::from_secs(10), start);

        assert_eq!(bucket.adjusted_usage(start + TimeDelta::seconds(5)), 0.0);
    }

    #[test]
    fn test_usage_clamps_at_zero() {
        let start = Utc::now();
        let bucket = bucket_with_usage(5.0, 10.0, Duration::from_secs(10), start);

        assert_eq!(bucket.adjusted_usage(start + TimeDelta::seconds(60)), 0.0);
    }

    #[test]
    fn test_epoch_last_access_skips_decay() {
        let start = Utc::now();
        let mut bucket = bucket_with_usage(5.0, 10.0, Duration::from_secs(10), start);
        bucket.last_access = DateTime::UNIX_EPOCH;

        assert_eq!(bucket.adjusted_usage(start + TimeDelta::seconds(60)), 5.0);
    }

    #[test]
    fn test_clock_skew_grows_usage_back() {
        let start = Utc::now();
        let bucket = bucket_with_usage(5.0, 10.0, Duration::from_secs(10), start);

        // A reading taken "before" the last access runs the leak backwards.
        let usage = bucket.adjusted_usage(start - TimeDelta::seconds(1));
        assert!((usage - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_consume_within_limit_records_usage() {
        let start = Utc::now();
        let mut bucket = TokenBucket::new(10.0, Duration::from_secs(10), start);

        assert!(bucket.consume(4.0, start));
        assert_eq!(bucket.used(), 4.0);
        assert_eq!(bucket.last_access, start);
    }

    #[test]
    fn test_consume_up_to_exact_limit_succeeds() {
        let start = Utc::now();
        let mut bucket = TokenBucket::new(10.0, Duration::from_secs(10), start);

        assert!(bucket.consume(10.0, start));
        assert!(!bucket.consume(1.0, start));
    }

    #[test]
    fn test_failed_consume_leaves_bucket_untouched() {
        let start = Utc::now();
        let mut bucket = bucket_with_usage(8.0, 10.0, Duration::from_secs(10), start);
        let later = start + TimeDelta::seconds(1);

        // Adjusted usage at `later` is 7.0; 7.0 + 4.0 exceeds the limit.
        assert!(!bucket.consume(4.0, later));
        assert_eq!(bucket.used(), 8.0);
        assert_eq!(bucket.last_access, start);
    }

    #[test]
    fn test_consume_applies_decay_first() {
        let start = Utc::now();
        let mut bucket = bucket_with_usage(8.0, 10.0, Duration::from_secs(10), start);
        let later = start + TimeDelta::seconds(9);

        // Fully decayed by 9s; the new consumption starts from zero.
        assert!(bucket.consume(3.0, later));
        assert_eq!(bucket.used(), 3.0);
        assert_eq!(bucket.last_access, later);
    }

    #[test]
    fn test_usage_count_rounds_up() {
        assert_eq!(usage_count(0.0), 0);
        assert_eq!(usage_count(2.1), 3);
        assert_eq!(usage_count(5.0), 5);
    }

    #[test]
    fn test_wire_form_round_trips() {
        let start = Utc::now();
        let mut bucket = TokenBucket::new(7.0, Duration::from_millis(1_500), start);
        assert!(bucket.consume(2.0, start + TimeDelta::microseconds(123_456)));

        let decoded = TokenBucket::decode(&bucket.encode().unwrap()).unwrap();
        assert_eq!(decoded, bucket);
    }
}
