//! Quota Headers and Refusal Responses

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::ratelimit::limiter::RateLimitDecision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Whole seconds until `reset`, rounded up, never negative.
pub fn retry_after_secs(reset: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (reset - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        ((millis + 999) / 1000) as u64
    }
}

// == Decorate ==
/// Adds limit, remaining and reset (epoch seconds) to `headers`.
pub fn decorate(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.max_requests));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(decision.reset_time.timestamp().max(0)),
    );
}

// == Deny Response ==
/// 429 carrying the tier message, `Retry-After`, and quota headers with
/// remaining forced to zero.
pub fn deny_response(decision: &RateLimitDecision) -> Response {
    let retry_after = retry_after_secs(decision.reset_time, Utc::now());
    let message = decision
        .message
        .clone()
        .unwrap_or_else(|| "Too many requests".to_string());

    let body = Json(json!({
        "error": message,
        "retryAfter": retry_after,
        "limit": decision.max_requests,
        "remaining": 0,
        "resetTime": decision.reset_time,
    }));

    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    let headers = response.headers_mut();
    decorate(
        headers,
        &RateLimitDecision {
            remaining: 0,
            ..decision.clone()
        },
    );
    headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn decision(allowed: bool, remaining: u64, reset: DateTime<Utc>) -> RateLimitDecision {
        RateLimitDecision {
            allowed,
            count: 30 - remaining,
            remaining,
            max_requests: 30,
            reset_time: reset,
            message: (!allowed).then(|| "Too many search requests, please slow down.".to_string()),
        }
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = Utc.timestamp_millis_opt(1_000_000).unwrap();

        assert_eq!(retry_after_secs(now + Duration::milliseconds(1), now), 1);
        assert_eq!(retry_after_secs(now + Duration::milliseconds(1000), now), 1);
        assert_eq!(retry_after_secs(now + Duration::milliseconds(1001), now), 2);
        assert_eq!(retry_after_secs(now + Duration::seconds(60), now), 60);
    }

    #[test]
    fn test_retry_after_never_negative() {
        let now = Utc::now();
        assert_eq!(retry_after_secs(now - Duration::seconds(5), now), 0);
        assert_eq!(retry_after_secs(now, now), 0);
    }

    #[test]
    fn test_decorate_adds_quota_headers() {
        let reset = Utc.timestamp_opt(1_700_000_060, 0).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        decorate(&mut headers, &decision(true, 12, reset));

        assert_eq!(headers["x-ratelimit-limit"], "30");
        assert_eq!(headers["x-ratelimit-remaining"], "12");
        assert_eq!(headers["x-ratelimit-reset"], "1700000060");
        assert_eq!(headers["content-type"], "application/json");
    }

    #[test]
    fn test_deny_response() {
        let reset = Utc::now() + Duration::milliseconds(42_500);
        let response = deny_response(&decision(false, 0, reset));

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["x-ratelimit-limit"], "30");

        let retry_after: u64 = headers["retry-after"].to_str().unwrap().parse().unwrap();
        assert!((42..=43).contains(&retry_after));
    }

    #[test]
    fn test_deny_response_forces_zero_remaining() {
        // A fail-open or stale decision still advertises nothing left
        let reset = Utc::now() + Duration::seconds(10);
        let response = deny_response(&decision(true, 5, reset));
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    }
}
