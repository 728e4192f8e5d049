//! In-Memory Counter Store
//!
//! Per-instance fallback used when no shared backend is available. Each key
//! keeps the timestamps of its admitted requests and is filtered against a
//! sliding window on every check. Counts are not shared across instances.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cache::current_timestamp_ms;
use crate::ratelimit::counter::{CounterStore, LimiterError, WindowState};
use crate::ratelimit::tier::TierPolicy;
use crate::tasks::{spawn_sweeper, Sweep, SweeperHandle};

#[derive(Debug)]
struct SlidingLog {
    hits: VecDeque<u64>,
    window_ms: u64,
}

impl SlidingLog {
    fn prune(&mut self, now: u64) {
        while self
            .hits
            .front()
            .is_some_and(|ts| ts.saturating_add(self.window_ms) <= now)
        {
            self.hits.pop_front();
        }
    }
}

#[derive(Debug, Default)]
struct Windows {
    logs: Mutex<HashMap<String, SlidingLog>>,
}

impl Windows {
    async fn purge_at(&self, now: u64) -> usize {
        let mut logs = self.logs.lock().await;
        let before = logs.len();
        logs.retain(|_, log| {
            log.prune(now);
            !log.hits.is_empty()
        });
        before - logs.len()
    }
}

#[async_trait]
impl Sweep for Windows {
    fn name(&self) -> &'static str {
        "rate-limit window"
    }

    async fn sweep(&self) -> usize {
        self.purge_at(current_timestamp_ms()).await
    }
}

// == In-Memory Counter Store ==
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    windows: Arc<Windows>,
    sweeper: Option<SweeperHandle>,
}

impl InMemoryCounterStore {
    /// Store without background purging.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that purges idle keys every `interval`. The sweeper stops when
    /// the store is dropped or [`stop`](Self::stop) is called.
    pub fn with_sweeper(interval: Duration) -> Self {
        let windows = Arc::new(Windows::default());
        let sweeper = spawn_sweeper(Arc::downgrade(&windows), interval);
        Self {
            windows,
            sweeper: Some(sweeper),
        }
    }

    pub fn stop(&self) {
        if let Some(sweeper) = &self.sweeper {
            sweeper.stop();
        }
    }

    /// Records a request at `now`; the read-filter-append runs under one lock.
    pub async fn hit_at(&self, key: &str, policy: &TierPolicy, now: u64) -> WindowState {
        let mut logs = self.windows.logs.lock().await;
        let log = logs.entry(key.to_string()).or_insert_with(|| SlidingLog {
            hits: VecDeque::new(),
            window_ms: policy.window_ms,
        });
        log.window_ms = policy.window_ms;
        log.prune(now);

        let allowed = (log.hits.len() as u64) < policy.max_requests;
        if allowed {
            log.hits.push_back(now);
        }

        let oldest = log.hits.front().copied().unwrap_or(now);
        WindowState {
            allowed,
            count: log.hits.len() as u64,
            reset_at_ms: oldest.saturating_add(policy.window_ms),
        }
    }

    /// Keys currently holding at least one timestamp.
    pub async fn tracked_keys(&self) -> usize {
        self.windows.logs.lock().await.len()
    }

    /// Drops every key whose window has fully elapsed; returns how many.
    pub async fn purge_expired(&self) -> usize {
        self.windows.sweep().await
    }

    #[cfg(test)]
    async fn purge_at(&self, now: u64) -> usize {
        self.windows.purge_at(now).await
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn hit(&self, key: &str, policy: &TierPolicy) -> Result<WindowState, LimiterError> {
        Ok(self.hit_at(key, policy, current_timestamp_ms()).await)
    }

    fn kind(&self) -> &'static str {
        "in-memory"
    }
}
