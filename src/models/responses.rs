//! Response DTOs for the bus tracking API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStatsSnapshot;

/// Response body for the DELETE endpoints
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The id that was deleted
    pub id: String,
}

impl DeleteResponse {
    pub fn new(kind: &str, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            message: format!("{} '{}' deleted successfully", kind, id),
            id,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Cache connection state; the service stays healthy without a cache
    pub cache: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(cache_state: &str) -> Self {
        Self {
            status: "healthy".to_string(),
            cache: cache_state.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for GET /admin/cache/stats
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub state: String,
    pub limiter_store: String,
    #[serde(flatten)]
    pub cache: CacheStatsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_response_serialize() {
        let resp = DeleteResponse::new("Bus", "b1");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("Bus 'b1' deleted successfully"));
        assert!(json.contains(r#""id":"b1""#));
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy("disconnected");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("disconnected"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_stats_response_flattens_counters() {
        let resp = StatsResponse {
            state: "connected".to_string(),
            limiter_store: "shared".to_string(),
            cache: CacheStatsSnapshot {
                hits: 8,
                misses: 2,
                writes: 3,
                errors: 0,
                hit_rate: 0.8,
            },
        };

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["limiterStore"], "shared");
        assert_eq!(value["hits"], 8);
        assert_eq!(value["hitRate"], 0.8);
    }
}
