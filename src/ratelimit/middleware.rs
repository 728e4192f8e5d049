//! Rate Limit Middleware
//!
//! Runs the limiter ahead of a route group. Denied requests never reach
//! extractors or handlers; allowed responses carry quota headers.
//!
//! ```ignore
//! Router::new()
//!     .route("/buses", get(list_buses))
//!     .route_layer(middleware::from_fn_with_state(
//!         RateGuard::new(limiter, Tier::Public),
//!         enforce_rate_limit,
//!     ))
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};

use crate::ratelimit::identity::client_identity;
use crate::ratelimit::limiter::RateLimiter;
use crate::ratelimit::response::{decorate, deny_response};
use crate::ratelimit::tier::Tier;

/// Limiter bound to the tier of one route group.
#[derive(Clone)]
pub struct RateGuard {
    pub limiter: Arc<RateLimiter>,
    pub tier: Tier,
}

impl RateGuard {
    pub fn new(limiter: Arc<RateLimiter>, tier: Tier) -> Self {
        Self { limiter, tier }
    }
}

pub async fn enforce_rate_limit(
    State(guard): State<RateGuard>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(request.headers(), peer);

    let decision = guard.limiter.check_and_consume(&identity, guard.tier).await;
    if !decision.allowed {
        return deny_response(&decision);
    }

    let mut response = next.run(request).await;
    decorate(response.headers_mut(), &decision);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheFacade;
    use crate::ratelimit::{InMemoryCounterStore, SharedCounterStore, TierPolicy, TierTable};
    use crate::test_support::{BrokenBackend, SwitchConnector};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn app(limiter: RateLimiter, calls: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/ping",
                get(move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        "pong"
                    }
                }),
            )
            .route_layer(middleware::from_fn_with_state(
                RateGuard::new(Arc::new(limiter), Tier::Public),
                enforce_rate_limit,
            ))
    }

    fn ping(ip: &str) -> Request<Body> {
        Request::builder()
            .uri("/ping")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_denied_request_skips_handler() {
        let tiers = TierTable::default().with_policy(Tier::Public, TierPolicy::per_minute(2, "easy"));
        let limiter = RateLimiter::new(
            tiers,
            Arc::new(InMemoryCounterStore::new()),
            Duration::from_millis(200),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let app = app(limiter, calls.clone());

        for remaining in ["1", "0"] {
            let response = app.clone().oneshot(ping("1.2.3.4")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-ratelimit-remaining"], remaining);
            assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        }

        let response = app.clone().oneshot(ping("1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // A different client is unaffected
        let response = app.oneshot(ping("5.6.7.8")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_broken_backend_still_runs_handler() {
        let broken = Arc::new(BrokenBackend::failing());
        let cache = Arc::new(CacheFacade::new(
            Some(Arc::new(SwitchConnector::new(broken))),
            Duration::from_millis(50),
        ));
        let tiers = TierTable::default().with_policy(Tier::Public, TierPolicy::per_minute(1, "easy"));
        let limiter = RateLimiter::new(
            tiers,
            Arc::new(SharedCounterStore::new(cache)),
            Duration::from_millis(200),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let app = app(limiter, calls.clone());

        for _ in 0..5 {
            let response = app.clone().oneshot(ping("1.2.3.4")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-ratelimit-remaining"], "1");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
