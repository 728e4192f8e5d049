//! Counter Stores
//!
//! Strategy interface for per-(tier, identity) request windows, plus the
//! shared implementation backed by the cache facade.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::{current_timestamp_ms, BackendError, CacheBackend, CacheFacade};
use crate::ratelimit::tier::TierPolicy;

/// Failures while consulting a counter store. Always answered with fail-open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    #[error("counter backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("counter check timed out after {0}ms")]
    Timeout(u64),
}

/// Outcome of recording one request in a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub allowed: bool,
    /// Requests counted in the window, including this one when admitted
    pub count: u64,
    /// Unix milliseconds at which the window frees up
    pub reset_at_ms: u64,
}

/// Backend that counts requests per key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Checks the window for `key` and records the request if admitted.
    async fn hit(&self, key: &str, policy: &TierPolicy) -> Result<WindowState, LimiterError>;

    /// Label for log output.
    fn kind(&self) -> &'static str;
}

// == Shared Counter Store ==
/// Tumbling window kept in the shared cache backend, so every instance
/// pointed at the same backend sees the same counts.
///
/// The counter key expires one window after its first increment; the next
/// increment after that starts a fresh window at 1.
pub struct SharedCounterStore {
    cache: Arc<CacheFacade>,
}

impl SharedCounterStore {
    pub fn new(cache: Arc<CacheFacade>) -> Self {
        Self { cache }
    }

    async fn hit_backend(
        backend: &dyn CacheBackend,
        key: &str,
        policy: &TierPolicy,
    ) -> Result<WindowState, BackendError> {
        let now = current_timestamp_ms();

        // Refuse without incrementing once the window is already full
        let current = backend
            .get(key)
            .await?
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(0);
        if current >= policy.max_requests {
            let ttl = backend.ttl_ms(key).await?.unwrap_or(policy.window_ms);
            return Ok(WindowState {
                allowed: false,
                count: current,
                reset_at_ms: now + ttl,
            });
        }

        // Single round-trip increment; concurrent callers that passed the
        // read above are still refused here once the count tips over.
        let (count, ttl) = backend.incr(key).await?;
        let ttl = match ttl {
            Some(ttl) if count > 1 => ttl,
            _ => {
                backend.expire_ms(key, policy.window_ms).await?;
                policy.window_ms
            }
        };

        Ok(WindowState {
            allowed: count <= policy.max_requests,
            count,
            reset_at_ms: now + ttl,
        })
    }
}

#[async_trait]
impl CounterStore for SharedCounterStore {
    async fn hit(&self, key: &str, policy: &TierPolicy) -> Result<WindowState, LimiterError> {
        let backend = self
            .cache
            .connection()
            .await
            .ok_or(LimiterError::Backend(BackendError::Unavailable))?;

        match Self::hit_backend(backend.as_ref(), key, policy).await {
            Ok(state) => Ok(state),
            Err(e) => {
                self.cache.report_failure("rate-limit", key, &e);
                Err(e.into())
            }
        }
    }

    fn kind(&self) -> &'static str {
        "shared"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryBackend, MemoryConnector};
    use crate::test_support::{BrokenBackend, SwitchConnector};
    use std::time::Duration;

    fn shared_store() -> SharedCounterStore {
        let connector = MemoryConnector::new(Arc::new(MemoryBackend::new(1000)));
        let cache = CacheFacade::new(Some(Arc::new(connector)), Duration::from_millis(200));
        SharedCounterStore::new(Arc::new(cache))
    }

    #[tokio::test]
    async fn test_counts_up_to_limit_then_refuses() {
        let store = shared_store();
        let policy = TierPolicy::new(3, 60_000, "slow down");

        for expected in 1..=3 {
            let state = store.hit("k", &policy).await.unwrap();
            assert!(state.allowed);
            assert_eq!(state.count, expected);
        }

        let state = store.hit("k", &policy).await.unwrap();
        assert!(!state.allowed);
        assert_eq!(state.count, 3);
    }

    #[tokio::test]
    async fn test_reset_within_window() {
        let store = shared_store();
        let policy = TierPolicy::new(1, 60_000, "slow down");
        let before = current_timestamp_ms();

        store.hit("k", &policy).await.unwrap();
        let state = store.hit("k", &policy).await.unwrap();

        assert!(!state.allowed);
        assert!(state.reset_at_ms > before);
        assert!(state.reset_at_ms <= current_timestamp_ms() + 60_000);
    }

    #[tokio::test]
    async fn test_window_restarts_after_expiry() {
        let store = shared_store();
        let policy = TierPolicy::new(1, 100, "slow down");

        assert!(store.hit("k", &policy).await.unwrap().allowed);
        assert!(!store.hit("k", &policy).await.unwrap().allowed);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let state = store.hit("k", &policy).await.unwrap();
        assert!(state.allowed);
        assert_eq!(state.count, 1);
    }

    #[tokio::test]
    async fn test_backend_failure_is_error() {
        let broken = Arc::new(BrokenBackend::default());
        let cache = Arc::new(CacheFacade::new(
            Some(Arc::new(SwitchConnector::new(broken.clone()))),
            Duration::from_millis(100),
        ));
        let store = SharedCounterStore::new(cache.clone());
        let policy = TierPolicy::new(5, 60_000, "slow down");

        assert!(store.hit("k", &policy).await.is_ok());
        broken.set_failing(true);

        assert!(matches!(
            store.hit("k", &policy).await,
            Err(LimiterError::Backend(_))
        ));
        assert_eq!(cache.state(), crate::cache::ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_unconfigured_cache_is_unavailable() {
        let store = SharedCounterStore::new(Arc::new(CacheFacade::disconnected()));
        let policy = TierPolicy::new(5, 60_000, "slow down");

        assert_eq!(
            store.hit("k", &policy).await,
            Err(LimiterError::Backend(BackendError::Unavailable))
        );
    }
}
