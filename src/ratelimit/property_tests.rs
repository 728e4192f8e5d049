//! Property-Based Tests for Rate Limiting
//!
//! Uses proptest to check admission bounds of both counter stores.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use crate::cache::{CacheFacade, MemoryBackend, MemoryConnector};
use crate::ratelimit::{
    CounterStore, InMemoryCounterStore, RateLimiter, SharedCounterStore, Tier, TierPolicy,
    TierTable,
};

/// Non-decreasing request timestamps built from gaps.
fn timestamps_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..400, 1..120).prop_map(|gaps| {
        gaps.iter()
            .scan(0u64, |t, gap| {
                *t += gap;
                Some(*t)
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Within any span of one window length, the sliding log admits at most
    // max_requests.
    #[test]
    fn prop_sliding_window_never_exceeds_limit(
        max in 1u64..10,
        window_ms in 100u64..2_000,
        times in timestamps_strategy(),
    ) {
        let store = InMemoryCounterStore::new();
        let policy = TierPolicy::new(max, window_ms, "slow down");

        let admitted: Vec<u64> = tokio_test::block_on(async {
            let mut admitted = Vec::new();
            for &now in &times {
                if store.hit_at("k", &policy, now).await.allowed {
                    admitted.push(now);
                }
            }
            admitted
        });

        for (i, &start) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|&&t| t < start + window_ms)
                .count() as u64;
            prop_assert!(in_window <= max, "{} admitted within one window, limit {}", in_window, max);
        }
    }

    // A request is refused only when the window is already full.
    #[test]
    fn prop_sliding_window_refusal_means_full(
        max in 1u64..10,
        window_ms in 100u64..2_000,
        times in timestamps_strategy(),
    ) {
        let store = InMemoryCounterStore::new();
        let policy = TierPolicy::new(max, window_ms, "slow down");

        tokio_test::block_on(async {
            for &now in &times {
                let state = store.hit_at("k", &policy, now).await;
                if !state.allowed {
                    prop_assert_eq!(state.count, max);
                    prop_assert!(state.reset_at_ms > now);
                }
            }
            Ok(())
        })?;
    }

    // Sequential requests against the shared store: exactly min(n, max) pass
    // and remaining counts down to zero.
    #[test]
    fn prop_shared_store_admits_exactly_limit(max in 1u64..40, n in 1u64..80) {
        let connector = MemoryConnector::new(Arc::new(MemoryBackend::new(100)));
        let cache = Arc::new(CacheFacade::new(Some(Arc::new(connector)), Duration::from_secs(1)));
        let store: Arc<dyn CounterStore> = Arc::new(SharedCounterStore::new(cache));
        let tiers = TierTable::default().with_policy(Tier::Search, TierPolicy::per_minute(max, "slow"));
        let limiter = RateLimiter::new(tiers, store, Duration::from_secs(1));

        let decisions = tokio_test::block_on(async {
            let mut decisions = Vec::new();
            for _ in 0..n {
                decisions.push(limiter.check_and_consume("1.2.3.4", Tier::Search).await);
            }
            decisions
        });

        let admitted = decisions.iter().filter(|d| d.allowed).count() as u64;
        prop_assert_eq!(admitted, n.min(max));
        for (i, decision) in decisions.iter().enumerate() {
            let expected = max.saturating_sub(i as u64 + 1);
            prop_assert_eq!(decision.remaining, expected);
        }
    }
}
