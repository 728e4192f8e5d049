//! Redis Cache Backend
//!
//! Talks to any Redis-compatible server through a `ConnectionManager`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::Client;
use tracing::debug;

use crate::cache::backend::{redact_url, BackendError, CacheBackend, CacheConnector};

fn command_error(op: &str, e: redis::RedisError) -> BackendError {
    BackendError::Command(format!("Redis {} error: {}", op, e))
}

// == Redis Backend ==
/// Live handle to a Redis server. Cloning the manager is cheap and the
/// manager is safe to share across tasks.
#[derive(Clone)]
pub struct RedisBackend {
    connection_manager: ConnectionManager,
}

impl RedisBackend {
    fn conn(&self) -> ConnectionManager {
        self.connection_manager.clone()
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut self.conn())
            .await
            .map_err(|e| command_error("GET", e))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), BackendError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl_secs {
            cmd.arg("EX").arg(ttl.max(1));
        }

        cmd.query_async::<()>(&mut self.conn())
            .await
            .map_err(|e| command_error("SET", e))
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        let removed = redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut self.conn())
            .await
            .map_err(|e| command_error("DEL", e))?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        let found = redis::cmd("EXISTS")
            .arg(key)
            .query_async::<i64>(&mut self.conn())
            .await
            .map_err(|e| command_error("EXISTS", e))?;
        Ok(found > 0)
    }

    async fn incr(&self, key: &str) -> Result<(u64, Option<u64>), BackendError> {
        // MULTI/EXEC so the count and its expiry come from the same instant
        let (count, pttl): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(|e| command_error("INCR", e))?;

        let ttl = (pttl >= 0).then_some(pttl as u64);
        Ok((count.max(0) as u64, ttl))
    }

    async fn expire_ms(&self, key: &str, ttl_ms: u64) -> Result<(), BackendError> {
        redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_ms)
            .query_async::<i64>(&mut self.conn())
            .await
            .map_err(|e| command_error("PEXPIRE", e))?;
        Ok(())
    }

    async fn ttl_ms(&self, key: &str) -> Result<Option<u64>, BackendError> {
        // -2 = missing key, -1 = no expiry
        let pttl = redis::cmd("PTTL")
            .arg(key)
            .query_async::<i64>(&mut self.conn())
            .await
            .map_err(|e| command_error("PTTL", e))?;
        Ok((pttl >= 0).then_some(pttl as u64))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        redis::cmd("PING")
            .query_async::<String>(&mut self.conn())
            .await
            .map(|_| ())
            .map_err(|e| command_error("PING", e))
    }
}

// == Redis Connector ==
/// Opens a `ConnectionManager` and verifies it with `PING`.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    url: String,
    timeout: Duration,
}

impl RedisConnector {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    /// Manager settings: one retry, and the handshake timeout applied to
    /// both connecting and each response.
    fn manager_config(&self) -> ConnectionManagerConfig {
        ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(self.timeout)
            .set_response_timeout(self.timeout)
    }
}

#[async_trait]
impl CacheConnector for RedisConnector {
    async fn connect(&self) -> Result<Arc<dyn CacheBackend>, BackendError> {
        let client = Client::open(self.url.as_str())
            .map_err(|e| BackendError::Connection(format!("invalid cache URL: {}", e)))?;

        let connection_manager = client
            .get_connection_manager_with_config(self.manager_config())
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let backend = RedisBackend { connection_manager };
        backend
            .ping()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        debug!("Redis handshake completed for {}", self.describe());
        Ok(Arc::new(backend))
    }

    fn describe(&self) -> String {
        redact_url(&self.url)
    }
}
