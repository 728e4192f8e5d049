//! Rate Limit Tiers
//!
//! Named policy buckets and the immutable table mapping each to its quota.

use std::fmt;

use serde::Serialize;

/// Class of endpoints sharing one quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Anonymous read traffic
    Public,
    /// Query endpoints, more expensive per request
    Search,
    /// Fleet operators pushing updates
    Operator,
    /// Administrative endpoints
    Admin,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Public, Tier::Search, Tier::Operator, Tier::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Public => "public",
            Tier::Search => "search",
            Tier::Operator => "operator",
            Tier::Admin => "admin",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quota applied to one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests admitted per window
    pub max_requests: u64,
    /// Text returned to refused callers
    pub message: String,
}

impl TierPolicy {
    pub fn new(max_requests: u64, window_ms: u64, message: impl Into<String>) -> Self {
        Self {
            window_ms,
            max_requests,
            message: message.into(),
        }
    }

    /// `max_requests` per minute.
    pub fn per_minute(max_requests: u64, message: impl Into<String>) -> Self {
        Self::new(max_requests, 60_000, message)
    }
}

/// Policy for every tier. Built once at startup, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    policies: [TierPolicy; 4],
}

impl TierTable {
    pub fn policy(&self, tier: Tier) -> &TierPolicy {
        &self.policies[tier.index()]
    }

    /// Returns a copy of the table with `tier` replaced.
    pub fn with_policy(mut self, tier: Tier, policy: TierPolicy) -> Self {
        self.policies[tier.index()] = policy;
        self
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            policies: [
                TierPolicy::per_minute(100, "Too many requests, please try again later."),
                TierPolicy::per_minute(30, "Too many search requests, please slow down."),
                TierPolicy::per_minute(200, "Operator request limit exceeded, please retry shortly."),
                TierPolicy::per_minute(300, "Admin request limit exceeded, please retry shortly."),
            ],
        }
    }
}
