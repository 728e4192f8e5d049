//! Cache Entry Module
//!
//! A value held by the in-process backend, with an optional expiry instant.

use std::time::{SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// A single stored value. An entry past its expiry is treated as absent.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: String,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    /// Creates an entry expiring `ttl_ms` after `now`.
    pub fn new(value: String, ttl_ms: Option<u64>, now: u64) -> Self {
        Self {
            value,
            expires_at: ttl_ms.map(|ttl| now.saturating_add(ttl)),
        }
    }

    /// Expired once `now` reaches the expiry instant.
    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expires) if now >= expires)
    }

    /// Remaining TTL in milliseconds, or None if no expiration is set.
    pub fn ttl_remaining_ms(&self, now: u64) -> Option<u64> {
        self.expires_at.map(|expires| expires.saturating_sub(now))
    }
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
