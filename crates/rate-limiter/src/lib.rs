//! Sliding-window distributed rate limiting over a pluggable counter store.

mod error;
mod limiter;
mod store;

pub use error::CounterError;
pub use limiter::{Decision, LimitType, RateLimiter, RateLimits};
pub use store::{Admission, CounterStore, InMemoryCounterStore, RedisCounterStore};
