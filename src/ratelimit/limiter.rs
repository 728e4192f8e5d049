//! Rate Limiter Service
//!
//! Decides allow/deny for a (tier, identity) pair. Any failure of the
//! counter store answers "allowed" so throttling never costs a legitimate
//! request.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cache::{current_timestamp_ms, CacheFacade};
use crate::config::Config;
use crate::ratelimit::counter::{CounterStore, LimiterError, SharedCounterStore, WindowState};
use crate::ratelimit::sliding::InMemoryCounterStore;
use crate::ratelimit::tier::{Tier, TierPolicy, TierTable};

// == Decision ==
/// Quota outcome for one request, also the payload behind quota headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub count: u64,
    pub remaining: u64,
    pub max_requests: u64,
    pub reset_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RateLimitDecision {
    fn from_window(window: WindowState, policy: &TierPolicy) -> Self {
        Self {
            allowed: window.allowed,
            count: window.count,
            remaining: if window.allowed {
                policy.max_requests.saturating_sub(window.count)
            } else {
                0
            },
            max_requests: policy.max_requests,
            reset_time: millis_to_datetime(window.reset_at_ms),
            message: (!window.allowed).then(|| policy.message.clone()),
        }
    }

    /// Permissive quota handed out when the counter store misbehaves.
    pub fn fail_open(policy: &TierPolicy) -> Self {
        Self {
            allowed: true,
            count: 0,
            remaining: policy.max_requests,
            max_requests: policy.max_requests,
            reset_time: millis_to_datetime(current_timestamp_ms() + policy.window_ms),
            message: None,
        }
    }
}

fn millis_to_datetime(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_else(Utc::now)
}

fn sweep_interval(config: &Config) -> Duration {
    Duration::from_secs(config.cleanup_interval.max(1))
}

/// Counter key for a (tier, identity) pair.
pub fn window_key(tier: Tier, identity: &str) -> String {
    format!("ratelimit:{}:{}", tier, identity)
}

// == Rate Limiter ==
pub struct RateLimiter {
    tiers: TierTable,
    store: Arc<dyn CounterStore>,
    check_timeout: Duration,
}

impl RateLimiter {
    pub fn new(tiers: TierTable, store: Arc<dyn CounterStore>, check_timeout: Duration) -> Self {
        Self {
            tiers,
            store,
            check_timeout,
        }
    }

    /// Picks the counter store once: the shared backend when a remote cache
    /// is configured and answers its first handshake, the per-instance
    /// in-memory store otherwise. A `memory://` cache is local to this
    /// process and evicts under capacity pressure, so counters never live
    /// in it.
    pub async fn connect(config: &Config, cache: Arc<CacheFacade>) -> Self {
        // Handshake plus one check, each bounded by the cache timeout
        let check_timeout = Duration::from_millis(config.cache_timeout_ms.saturating_mul(2).max(1));
        let local_cache = config.cache_target.as_ref().is_some_and(|t| t.is_memory());

        let store: Arc<dyn CounterStore> = if !cache.is_configured() {
            info!("Rate limiter using in-memory counters (no cache configured)");
            Arc::new(InMemoryCounterStore::with_sweeper(sweep_interval(config)))
        } else if local_cache {
            info!("Rate limiter using in-memory counters (cache is process-local)");
            Arc::new(InMemoryCounterStore::with_sweeper(sweep_interval(config)))
        } else if cache.connect().await {
            info!("Rate limiter using shared cache counters");
            Arc::new(SharedCounterStore::new(cache))
        } else {
            warn!("Cache unreachable at startup, rate limiter falling back to in-memory counters");
            Arc::new(InMemoryCounterStore::with_sweeper(sweep_interval(config)))
        };

        Self::new(config.tiers.clone(), store, check_timeout)
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn store_kind(&self) -> &'static str {
        self.store.kind()
    }

    // == Check And Consume ==
    /// Records one request for `identity` under `tier`. Never fails: store
    /// errors and timeouts produce a fail-open decision.
    pub async fn check_and_consume(&self, identity: &str, tier: Tier) -> RateLimitDecision {
        let policy = self.tiers.policy(tier);
        let key = window_key(tier, identity);

        let outcome = match tokio::time::timeout(self.check_timeout, self.store.hit(&key, policy)).await
        {
            Ok(result) => result,
            Err(_) => Err(LimiterError::Timeout(self.check_timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(window) => {
                let decision = RateLimitDecision::from_window(window, policy);
                if !decision.allowed {
                    warn!(
                        tier = %tier,
                        identity,
                        count = decision.count,
                        limit = decision.max_requests,
                        "Rate limit exceeded"
                    );
                }
                decision
            }
            Err(e) => {
                error!(
                    tier = %tier,
                    identity,
                    store = self.store.kind(),
                    error = %e,
                    "Rate limiter backend failed, allowing request"
                );
                RateLimitDecision::fail_open(policy)
            }
        }
    }
}
