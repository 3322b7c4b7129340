//! Rate limiting logic and state management.

mod bucket;
mod limiter;
mod worker;

pub use bucket::TokenBucket;
pub use limiter::Ratelimit;
