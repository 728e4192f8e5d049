//! Cache Module
//!
//! A never-failing cache facade over a Redis-compatible or in-process backend.

mod backend;
mod entry;
mod facade;
mod memory;
mod redis_backend;
mod stats;


// Re-export public types
pub use backend::{
    redact_url, BackendError, CacheBackend, CacheConnector, CacheTarget, ConnectionState,
};
pub use entry::{current_timestamp_ms, CacheEntry};
pub use facade::CacheFacade;
pub use memory::{MemoryBackend, MemoryConnector};
pub use redis_backend::{RedisBackend, RedisConnector};
pub use stats::{CacheStats, CacheStatsSnapshot};
