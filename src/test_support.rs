//! Test doubles shared by unit tests: misbehaving cache backends and a
//! tracing layer that records emitted events.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use crate::cache::{BackendError, CacheBackend, CacheConnector, MemoryBackend};

/// Connector whose handshake always fails.
pub struct FailingConnector;

#[async_trait]
impl CacheConnector for FailingConnector {
    async fn connect(&self) -> Result<Arc<dyn CacheBackend>, BackendError> {
        Err(BackendError::Connection("connection refused".to_string()))
    }

    fn describe(&self) -> String {
        "redis://unreachable:6379".to_string()
    }
}

/// In-process backend that can be switched into failing every command.
pub struct BrokenBackend {
    inner: MemoryBackend,
    failing: AtomicBool,
}

impl Default for BrokenBackend {
    fn default() -> Self {
        Self {
            inner: MemoryBackend::new(1000),
            failing: AtomicBool::new(false),
        }
    }
}

impl BrokenBackend {
    pub fn failing() -> Self {
        let backend = Self::default();
        backend.set_failing(true);
        backend
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BackendError::Command("broken pipe".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheBackend for BrokenBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), BackendError> {
        self.check()?;
        self.inner.set(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn incr(&self, key: &str) -> Result<(u64, Option<u64>), BackendError> {
        self.check()?;
        self.inner.incr(key).await
    }

    async fn expire_ms(&self, key: &str, ttl_ms: u64) -> Result<(), BackendError> {
        self.check()?;
        self.inner.expire_ms(key, ttl_ms).await
    }

    async fn ttl_ms(&self, key: &str) -> Result<Option<u64>, BackendError> {
        self.check()?;
        self.inner.ttl_ms(key).await
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.check()
    }
}

/// Connector handing out a shared [`BrokenBackend`].
pub struct SwitchConnector {
    backend: Arc<BrokenBackend>,
}

impl SwitchConnector {
    pub fn new(backend: Arc<BrokenBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl CacheConnector for SwitchConnector {
    async fn connect(&self) -> Result<Arc<dyn CacheBackend>, BackendError> {
        self.backend.ping().await?;
        Ok(self.backend.clone())
    }

    fn describe(&self) -> String {
        "memory://switch".to_string()
    }
}

/// Records the level and message of every event on the current thread.
#[derive(Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl LogCapture {
    /// Installs the capture as the thread-local default subscriber.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }

    pub fn count(&self, level: Level) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.events
            .lock()
            .unwrap()
            .iter()
            .any(|(l, msg)| *l == level && msg.contains(needle))
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}
