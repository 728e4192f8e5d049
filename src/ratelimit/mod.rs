//! Rate Limit Module
//!
//! Tiered, fail-open request throttling.
//!
//! # Counting strategies
//! - Shared: tumbling window in the cache backend (atomic increment, expiry
//!   set on the first hit of a window)
//! - In-memory: per-instance sliding log of timestamps, used when no shared
//!   backend is reachable at startup
//!
//! The two admit slightly different patterns at window boundaries: the
//! tumbling window can admit up to twice the limit across a boundary, the
//! sliding log never admits more than the limit in any window-length span.

mod counter;
mod identity;
mod limiter;
mod middleware;
mod response;
mod sliding;
mod tier;

#[cfg(test)]
mod property_tests;

pub use counter::{CounterStore, LimiterError, SharedCounterStore, WindowState};
pub use identity::{client_identity, UNKNOWN_IDENTITY};
pub use limiter::{window_key, RateLimitDecision, RateLimiter};
pub use middleware::{enforce_rate_limit, RateGuard};
pub use response::{
    decorate, deny_response, retry_after_secs, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING,
    X_RATELIMIT_RESET,
};
pub use sliding::InMemoryCounterStore;
pub use tier::{Tier, TierPolicy, TierTable};
