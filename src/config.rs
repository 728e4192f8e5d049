//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::cache::CacheTarget;
use crate::ratelimit::{Tier, TierPolicy, TierTable};

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Where the cache backend lives, None = permanently disconnected
    pub cache_target: Option<CacheTarget>,
    /// Upper bound for a single cache round trip (and the connect handshake)
    pub cache_timeout_ms: u64,
    /// TTL in seconds for cached bus and route records
    pub record_ttl: u64,
    /// TTL in seconds for cached live locations
    pub location_ttl: u64,
    /// Background sweep interval in seconds
    pub cleanup_interval: u64,
    /// Capacity of the in-process cache backend
    pub memory_cache_entries: usize,
    /// Rate limit policies per tier
    pub tiers: TierTable,
    /// Raw `token:subject:role` triples for the static authorizer
    pub api_tokens: Vec<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_URL` - Full cache connection URL, or `memory://`
    /// - `CACHE_HOST` / `CACHE_PORT` - Used when `CACHE_URL` is absent (port default: 6379)
    /// - `CACHE_TIMEOUT_MS` - Per-operation cache timeout (default: 500)
    /// - `CACHE_RECORD_TTL` - Record TTL in seconds (default: 300)
    /// - `CACHE_LOCATION_TTL` - Location TTL in seconds (default: 30)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `MEMORY_CACHE_ENTRIES` - In-process cache capacity (default: 10000)
    /// - `RATE_LIMIT_<TIER>_MAX` / `RATE_LIMIT_<TIER>_WINDOW_MS` - Tier overrides
    /// - `API_TOKENS` - Comma separated `token:subject:role` triples
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cache_target: cache_target_from_env(),
            cache_timeout_ms: env_or("CACHE_TIMEOUT_MS", defaults.cache_timeout_ms),
            record_ttl: env_or("CACHE_RECORD_TTL", defaults.record_ttl),
            location_ttl: env_or("CACHE_LOCATION_TTL", defaults.location_ttl),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            memory_cache_entries: env_or("MEMORY_CACHE_ENTRIES", defaults.memory_cache_entries),
            tiers: tiers_from_env(),
            api_tokens: env::var("API_TOKENS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache_target: None,
            cache_timeout_ms: 500,
            record_ttl: 300,
            location_ttl: 30,
            cleanup_interval: 60,
            memory_cache_entries: 10_000,
            tiers: TierTable::default(),
            api_tokens: Vec::new(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// `CACHE_URL` wins over `CACHE_HOST`/`CACHE_PORT`; blank values count as unset.
fn cache_target_from_env() -> Option<CacheTarget> {
    if let Some(url) = env::var("CACHE_URL").ok().filter(|v| !v.trim().is_empty()) {
        return Some(CacheTarget::Url(url.trim().to_string()));
    }

    env::var("CACHE_HOST")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|host| CacheTarget::HostPort {
            host: host.trim().to_string(),
            port: env_or("CACHE_PORT", 6379),
        })
}

fn tiers_from_env() -> TierTable {
    let mut table = TierTable::default();

    for tier in Tier::ALL {
        let base = table.policy(tier).clone();
        let name = tier.as_str().to_ascii_uppercase();
        let policy = TierPolicy {
            max_requests: env_or(&format!("RATE_LIMIT_{}_MAX", name), base.max_requests),
            window_ms: env_or(&format!("RATE_LIMIT_{}_WINDOW_MS", name), base.window_ms),
            message: base.message,
        };
        table = table.with_policy(tier, policy);
    }

    table
}
