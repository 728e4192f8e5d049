//! In-Process Cache Backend
//!
//! TTL map behind a mutex, selected with a `memory://` target. Useful for
//! single-instance deployments and tests; state is never shared across
//! instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cache::backend::{BackendError, CacheBackend, CacheConnector};
use crate::cache::entry::{current_timestamp_ms, CacheEntry};
use crate::tasks::{spawn_sweeper, Sweep, SweeperHandle};

// == Memory Table ==
#[derive(Debug)]
struct MemoryTable {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
}

impl MemoryTable {
    /// Makes room for one new key: drops expired entries first, then the
    /// entry closest to expiry (persistent entries go last).
    fn make_room(entries: &mut HashMap<String, CacheEntry>, max_entries: usize, now: u64) {
        if entries.len() < max_entries {
            return;
        }
        entries.retain(|_, entry| !entry.is_expired_at(now));

        while entries.len() >= max_entries.max(1) {
            let victim = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at.unwrap_or(u64::MAX))
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Live entry for `key`, removing it if it has expired.
    fn live<'a>(
        entries: &'a mut HashMap<String, CacheEntry>,
        key: &str,
        now: u64,
    ) -> Option<&'a mut CacheEntry> {
        if entries.get(key).is_some_and(|e| e.is_expired_at(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl Sweep for MemoryTable {
    fn name(&self) -> &'static str {
        "memory cache"
    }

    async fn sweep(&self) -> usize {
        let now = current_timestamp_ms();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }
}

// == Memory Backend ==
/// In-process implementation of [`CacheBackend`].
#[derive(Debug)]
pub struct MemoryBackend {
    table: Arc<MemoryTable>,
    sweeper: Option<SweeperHandle>,
}

impl MemoryBackend {
    /// Creates a backend holding at most `max_entries` keys, without a sweeper.
    pub fn new(max_entries: usize) -> Self {
        Self {
            table: Arc::new(MemoryTable {
                entries: Mutex::new(HashMap::new()),
                max_entries,
            }),
            sweeper: None,
        }
    }

    /// Creates a backend with a background sweeper. Requires a Tokio runtime.
    pub fn with_sweeper(max_entries: usize, interval: Duration) -> Self {
        let mut backend = Self::new(max_entries);
        backend.sweeper = Some(spawn_sweeper(Arc::downgrade(&backend.table), interval));
        backend
    }

    /// Number of stored keys, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.table.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Runs one sweep immediately.
    pub async fn purge_expired(&self) -> usize {
        self.table.sweep().await
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let now = current_timestamp_ms();
        let mut entries = self.table.entries.lock().await;
        Ok(MemoryTable::live(&mut entries, key, now).map(|e| e.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), BackendError> {
        let now = current_timestamp_ms();
        let mut entries = self.table.entries.lock().await;

        if !entries.contains_key(key) {
            MemoryTable::make_room(&mut entries, self.table.max_entries, now);
        }
        let ttl_ms = ttl_secs.map(|s| s.saturating_mul(1000));
        entries.insert(key.to_string(), CacheEntry::new(value.to_string(), ttl_ms, now));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        let now = current_timestamp_ms();
        let mut entries = self.table.entries.lock().await;
        let was_live = MemoryTable::live(&mut entries, key, now).is_some();
        entries.remove(key);
        Ok(was_live)
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        let now = current_timestamp_ms();
        let mut entries = self.table.entries.lock().await;
        Ok(MemoryTable::live(&mut entries, key, now).is_some())
    }

    async fn incr(&self, key: &str) -> Result<(u64, Option<u64>), BackendError> {
        let now = current_timestamp_ms();
        let mut entries = self.table.entries.lock().await;

        if let Some(entry) = MemoryTable::live(&mut entries, key, now) {
            let current: u64 = entry.value.parse().map_err(|_| {
                BackendError::Command(format!("value at '{}' is not an integer", key))
            })?;
            let next = current + 1;
            entry.value = next.to_string();
            return Ok((next, entry.ttl_remaining_ms(now)));
        }

        MemoryTable::make_room(&mut entries, self.table.max_entries, now);
        entries.insert(key.to_string(), CacheEntry::new("1".to_string(), None, now));
        Ok((1, None))
    }

    async fn expire_ms(&self, key: &str, ttl_ms: u64) -> Result<(), BackendError> {
        let now = current_timestamp_ms();
        let mut entries = self.table.entries.lock().await;
        if let Some(entry) = MemoryTable::live(&mut entries, key, now) {
            entry.expires_at = Some(now.saturating_add(ttl_ms));
        }
        Ok(())
    }

    async fn ttl_ms(&self, key: &str) -> Result<Option<u64>, BackendError> {
        let now = current_timestamp_ms();
        let mut entries = self.table.entries.lock().await;
        Ok(MemoryTable::live(&mut entries, key, now).and_then(|e| e.ttl_remaining_ms(now)))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

// == Memory Connector ==
/// Hands out the same in-process backend on every connect.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    backend: Arc<MemoryBackend>,
}

impl MemoryConnector {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl CacheConnector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn CacheBackend>, BackendError> {
        Ok(self.backend.clone())
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}
