//! Cache Facade Module
//!
//! Wraps a [`CacheBackend`] behind operations that never fail. Every backend
//! error, timeout or missing connection degrades to a miss (`None`/`false`)
//! plus a warning in the log, so call sites always fall back to the store.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::backend::{BackendError, CacheBackend, CacheConnector, ConnectionState};
use crate::cache::memory::{MemoryBackend, MemoryConnector};
use crate::cache::redis_backend::RedisConnector;
use crate::cache::stats::{CacheStats, CacheStatsSnapshot};
use crate::config::Config;

struct Link {
    state: ConnectionState,
    backend: Option<Arc<dyn CacheBackend>>,
    /// Set after a failed handshake; no redial before this instant.
    retry_at: Option<Instant>,
}

// == Cache Facade ==
/// Long-lived, failure-swallowing cache client. Construct one per process
/// and share it by reference.
pub struct CacheFacade {
    connector: Option<Arc<dyn CacheConnector>>,
    link: RwLock<Link>,
    /// Held for the duration of a handshake so concurrent callers share one.
    handshake: Mutex<()>,
    /// Completed handshakes, successful or not.
    attempts: AtomicU64,
    op_timeout: Duration,
    stats: CacheStats,
}

impl CacheFacade {
    /// Creates a facade over `connector`. With `None` the facade stays
    /// disconnected forever and every read is a miss.
    pub fn new(connector: Option<Arc<dyn CacheConnector>>, op_timeout: Duration) -> Self {
        Self {
            connector,
            link: RwLock::new(Link {
                state: ConnectionState::Uninitialized,
                backend: None,
                retry_at: None,
            }),
            handshake: Mutex::new(()),
            attempts: AtomicU64::new(0),
            op_timeout,
            stats: CacheStats::new(),
        }
    }

    /// A facade with no backend at all.
    pub fn disconnected() -> Self {
        Self::new(None, Duration::from_millis(0))
    }

    /// Builds the facade described by the configuration. Never fails; a
    /// `memory://` target starts its sweeper, which needs a Tokio runtime.
    pub fn from_config(config: &Config) -> Self {
        let timeout = Duration::from_millis(config.cache_timeout_ms);
        let connector: Option<Arc<dyn CacheConnector>> = match &config.cache_target {
            None => {
                info!("No cache target configured, caching disabled");
                None
            }
            Some(target) if target.is_memory() => {
                let backend = MemoryBackend::with_sweeper(
                    config.memory_cache_entries,
                    Duration::from_secs(config.cleanup_interval.max(1)),
                );
                Some(Arc::new(MemoryConnector::new(Arc::new(backend))))
            }
            Some(target) => {
                info!(endpoint = %target.redacted(), "Cache target configured");
                Some(Arc::new(RedisConnector::new(target.url(), timeout)))
            }
        };

        Self::new(connector, timeout)
    }

    /// Whether a backend target exists at all.
    pub fn is_configured(&self) -> bool {
        self.connector.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        self.link.read().unwrap_or_else(|p| p.into_inner()).state
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Performs the handshake now instead of on first use.
    pub async fn connect(&self) -> bool {
        self.connection().await.is_some()
    }

    /// Live backend handle, connecting first if needed. `None` when no
    /// target is configured or the handshake failed.
    ///
    /// At most one handshake runs at a time. Callers that queued behind it
    /// take its outcome instead of starting their own, and after a failed
    /// handshake no new one starts for one operation timeout.
    pub async fn connection(&self) -> Option<Arc<dyn CacheBackend>> {
        if let Some(backend) = self.current() {
            return Some(backend);
        }
        let connector = self.connector.as_ref()?;
        if self.backing_off() {
            return None;
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let _turn = self.handshake.lock().await;
        if let Some(backend) = self.current() {
            return Some(backend);
        }
        if self.attempts.load(Ordering::Acquire) != seen {
            return None;
        }

        let outcome = match tokio::time::timeout(self.op_timeout, connector.connect()).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.op_timeout.as_millis() as u64)),
        };

        let mut link = self.link.write().unwrap_or_else(|p| p.into_inner());
        self.attempts.fetch_add(1, Ordering::Release);
        match outcome {
            Ok(backend) => {
                if link.state == ConnectionState::Disconnected {
                    info!(endpoint = %connector.describe(), "Cache reconnected");
                } else {
                    info!(endpoint = %connector.describe(), "Cache connected");
                }
                link.state = ConnectionState::Connected;
                link.backend = Some(backend.clone());
                link.retry_at = None;
                Some(backend)
            }
            Err(e) => {
                warn!(endpoint = %connector.describe(), error = %e, "Cache connection failed");
                link.state = ConnectionState::Disconnected;
                link.backend = None;
                link.retry_at = Some(Instant::now() + self.op_timeout);
                None
            }
        }
    }

    /// Drops the current handle after a failed operation; the next operation
    /// reconnects.
    pub fn report_failure(&self, op: &str, key: &str, error: &BackendError) {
        self.stats.record_error();
        let mut link = self.link.write().unwrap_or_else(|p| p.into_inner());
        if link.state == ConnectionState::Connected {
            warn!(op, key, error = %error, "Cache operation failed, marking disconnected");
        } else {
            warn!(op, key, error = %error, "Cache operation failed");
        }
        link.state = ConnectionState::Disconnected;
        link.backend = None;
    }

    fn backing_off(&self) -> bool {
        self.link
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .retry_at
            .is_some_and(|at| Instant::now() < at)
    }

    fn current(&self) -> Option<Arc<dyn CacheBackend>> {
        self.link
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .backend
            .clone()
    }

    /// Runs one bounded operation, translating every failure into `None`.
    async fn run<T, F, Fut>(&self, op: &'static str, key: &str, f: F) -> Option<T>
    where
        F: FnOnce(Arc<dyn CacheBackend>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let Some(backend) = self.connection().await else {
            if self.is_configured() {
                warn!(op, key, "Cache unavailable, skipping");
            } else {
                debug!(op, key, "Cache not configured, skipping");
            }
            return None;
        };

        let outcome = match tokio::time::timeout(self.op_timeout, f(backend)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.op_timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                self.report_failure(op, key, &e);
                None
            }
        }
    }

    // == Get ==
    /// Value for `key`, or `None` on a miss, an expired entry, or an outage.
    pub async fn get(&self, key: &str) -> Option<String> {
        let value = self
            .run("get", key, |b| async move { b.get(key).await })
            .await
            .flatten();

        match &value {
            Some(_) => {
                self.stats.record_hit();
                debug!(key, "Cache hit");
            }
            None => {
                self.stats.record_miss();
                debug!(key, "Cache miss");
            }
        }
        value
    }

    // == Set ==
    /// Stores `value`; `false` means it was not stored and is never fatal.
    pub async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> bool {
        let stored = self
            .run("set", key, |b| async move { b.set(key, value, ttl_secs).await })
            .await
            .is_some();

        if stored {
            self.stats.record_write();
            debug!(key, ttl_secs, "Cache set");
        }
        stored
    }

    // == Delete ==
    /// Returns whether the key was present; `false` during an outage.
    pub async fn delete(&self, key: &str) -> bool {
        let removed = self
            .run("delete", key, |b| async move { b.delete(key).await })
            .await
            .unwrap_or(false);
        debug!(key, removed, "Cache delete");
        removed
    }

    // == Exists ==
    pub async fn exists(&self, key: &str) -> bool {
        self.run("exists", key, |b| async move { b.exists(key).await })
            .await
            .unwrap_or(false)
    }

    // == JSON Helpers ==
    /// Typed read; an undecodable value counts as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<u64>) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw, ttl_secs).await,
            Err(e) => {
                warn!(key, error = %e, "Value not cacheable");
                false
            }
        }
    }
}
