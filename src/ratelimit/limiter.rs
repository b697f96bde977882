//! Core multi-tier rate limiter.

use std::sync::Arc;
use tracing::{debug, trace};

use super::key::{CounterKey, DEFAULT_NAMESPACE};
use super::rules::{Tier, TierSet};
use super::store::{CounterStore, StoreError};
use super::window::{seconds_until_reset, window_end};
use crate::clock::{Clock, SystemClock};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Every tier is within its ceiling.
    Allowed,
    /// A tier ceiling was exceeded.
    Denied(Breach),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// The first tier found over its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breach {
    /// Position of the tier in the configured list
    pub tier_index: usize,
    pub tier: Tier,
    /// Count observed after this request's increment
    pub count: u64,
    /// Seconds until the breached window ends
    pub retry_after_secs: u64,
}

/// Evaluates requests against an ordered set of fixed-window tiers.
///
/// All cross-request coordination happens inside the counter store; the
/// limiter holds no mutable state and can be shared freely.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    tiers: TierSet,
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter over `store` using the system clock.
    pub fn new(store: Arc<dyn CounterStore>, tiers: TierSet) -> Self {
        Self {
            store,
            tiers,
            namespace: DEFAULT_NAMESPACE.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Check and count one request from `identity` on `route`.
    ///
    /// Tiers are visited in configured order. Each visited tier is
    /// incremented; the first whose count goes past its ceiling denies the
    /// request, and the tiers after it are left untouched. A store failure
    /// aborts the check.
    pub async fn check(&self, identity: &str, route: &str) -> Result<Admission, StoreError> {
        let now = self.clock.now_secs();

        for (tier_index, tier) in self.tiers.iter().enumerate() {
            let end = window_end(now, tier.window_secs);
            let key = CounterKey::new(route, identity, tier.window_secs, end).render(&self.namespace);

            let count = self.store.increment_and_expire(&key, end).await?;

            trace!(
                key = %key,
                count = count,
                limit = tier.max_requests,
                "Checked tier"
            );

            if count > tier.max_requests {
                debug!(
                    identity = %identity,
                    route = %route,
                    tier = tier_index,
                    window_secs = tier.window_secs,
                    count = count,
                    limit = tier.max_requests,
                    "Rate limit exceeded"
                );
                return Ok(Admission::Denied(Breach {
                    tier_index,
                    tier: *tier,
                    count,
                    retry_after_secs: seconds_until_reset(now, tier.window_secs),
                }));
            }
        }

        Ok(Admission::Allowed)
    }

    /// Store key the current window of the tier at `tier_index` uses for
    /// `identity` on `route`, or `None` past the last configured tier.
    pub fn key_for(&self, identity: &str, route: &str, tier_index: usize) -> Option<String> {
        let tier = self.tiers.as_slice().get(tier_index)?;
        let end = window_end(self.clock.now_secs(), tier.window_secs);
        Some(CounterKey::new(route, identity, tier.window_secs, end).render(&self.namespace))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const IP: &str = "10.1.2.3";
    const ROUTE: &str = "/events/hourly";

    fn limiter_with(tiers: Vec<Tier>, start: u64) -> (RateLimiter, Arc<MemoryStore>, ManualClock) {
        let clock = ManualClock::new(start);
        let store = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
        let limiter = RateLimiter::new(store.clone(), TierSet::new(tiers).unwrap())
            .with_clock(Arc::new(clock.clone()));
        (limiter, store, clock)
    }

    #[derive(Debug)]
    struct FailingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn increment_and_expire(&self, _key: &str, _expire_at: u64) -> Result<u64, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_admits_exactly_max_requests_per_window() {
        let (limiter, _, _) = limiter_with(vec![Tier::new(60, 5)], 1_000);

        for _ in 0..5 {
            assert_eq!(limiter.check(IP, ROUTE).await.unwrap(), Admission::Allowed);
        }

        match limiter.check(IP, ROUTE).await.unwrap() {
            Admission::Denied(breach) => {
                assert_eq!(breach.tier_index, 0);
                assert_eq!(breach.count, 6);
                assert_eq!(breach.retry_after_secs, 20);
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_two_allowed_then_denied_in_one_second() {
        let (limiter, _, _) = limiter_with(vec![Tier::new(1, 2)], 5_000);

        assert!(limiter.check(IP, ROUTE).await.unwrap().is_allowed());
        assert!(limiter.check(IP, ROUTE).await.unwrap().is_allowed());
        assert!(!limiter.check(IP, ROUTE).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_new_window_resets_budget() {
        let (limiter, _, clock) = limiter_with(vec![Tier::new(10, 3)], 100);

        for _ in 0..3 {
            assert!(limiter.check(IP, ROUTE).await.unwrap().is_allowed());
        }
        assert!(!limiter.check(IP, ROUTE).await.unwrap().is_allowed());

        clock.set(110);
        for _ in 0..3 {
            assert!(limiter.check(IP, ROUTE).await.unwrap().is_allowed());
        }
        assert!(!limiter.check(IP, ROUTE).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_burst_straddling_boundary() {
        let (limiter, _, clock) = limiter_with(vec![Tier::new(60, 10)], 119);

        for _ in 0..10 {
            assert!(limiter.check(IP, ROUTE).await.unwrap().is_allowed());
        }
        clock.set(120);
        for _ in 0..10 {
            assert!(limiter.check(IP, ROUTE).await.unwrap().is_allowed());
        }
    }

    #[tokio::test]
    async fn test_pairs_do_not_interfere() {
        let (limiter, store, _) = limiter_with(vec![Tier::new(60, 2)], 0);

        for _ in 0..3 {
            limiter.check(IP, ROUTE).await.unwrap();
        }
        assert!(!limiter.check(IP, ROUTE).await.unwrap().is_allowed());

        assert!(limiter.check("10.9.9.9", ROUTE).await.unwrap().is_allowed());
        assert!(limiter.check(IP, "/poi").await.unwrap().is_allowed());

        assert_eq!(store.count(&limiter.key_for(IP, ROUTE, 0).unwrap()), Some(4));
        assert_eq!(store.count(&limiter.key_for("10.9.9.9", ROUTE, 0).unwrap()), Some(1));
        assert_eq!(store.count(&limiter.key_for(IP, "/poi", 0).unwrap()), Some(1));
    }

    #[tokio::test]
    async fn test_tiers_after_breach_are_not_incremented() {
        let tiers = vec![Tier::new(60, 10), Tier::new(1, 1), Tier::new(3600, 300)];
        let (limiter, store, _) = limiter_with(tiers, 7_200);

        assert!(limiter.check(IP, ROUTE).await.unwrap().is_allowed());
        assert_eq!(store.count(&limiter.key_for(IP, ROUTE, 2).unwrap()), Some(1));

        match limiter.check(IP, ROUTE).await.unwrap() {
            Admission::Denied(breach) => assert_eq!(breach.tier_index, 1),
            other => panic!("expected denial, got {:?}", other),
        }

        // Tiers up to and including the breaching one consumed budget.
        assert_eq!(store.count(&limiter.key_for(IP, ROUTE, 0).unwrap()), Some(2));
        assert_eq!(store.count(&limiter.key_for(IP, ROUTE, 1).unwrap()), Some(2));
        // The tier after it did not.
        assert_eq!(store.count(&limiter.key_for(IP, ROUTE, 2).unwrap()), Some(1));
    }

    #[tokio::test]
    async fn test_short_tier_rolls_over_while_long_tier_accumulates() {
        let tiers = vec![Tier::new(1, 1), Tier::new(60, 5)];
        let (limiter, store, clock) = limiter_with(tiers, 600);

        assert!(limiter.check(IP, ROUTE).await.unwrap().is_allowed());
        assert_eq!(store.count(&limiter.key_for(IP, ROUTE, 0).unwrap()), Some(1));
        assert_eq!(store.count(&limiter.key_for(IP, ROUTE, 1).unwrap()), Some(1));

        clock.advance(1);
        assert!(limiter.check(IP, ROUTE).await.unwrap().is_allowed());
        assert_eq!(store.count(&limiter.key_for(IP, ROUTE, 0).unwrap()), Some(1));
        assert_eq!(store.count(&limiter.key_for(IP, ROUTE, 1).unwrap()), Some(2));
    }

    #[tokio::test]
    async fn test_counter_expires_at_window_end() {
        let tier = Tier::new(60, 10);
        let (limiter, store, _) = limiter_with(vec![tier], 130);

        limiter.check(IP, ROUTE).await.unwrap();
        assert_eq!(store.expiry(&limiter.key_for(IP, ROUTE, 0).unwrap()), Some(180));
    }

    #[tokio::test]
    async fn test_store_failure_aborts_evaluation() {
        let store = Arc::new(FailingStore {
            calls: AtomicUsize::new(0),
        });
        let limiter = RateLimiter::new(store.clone(), TierSet::default());

        let result = limiter.check(IP, ROUTE).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_namespace_prefixes_keys() {
        let (limiter, _, _) = limiter_with(vec![Tier::new(60, 1)], 0);
        let limiter = limiter.with_namespace("edge");

        let key = limiter.key_for(IP, "/", 0);
        assert_eq!(key.as_deref(), Some("edge/%2F/10.1.2.3/60:60"));
        assert_eq!(limiter.namespace(), "edge");
    }

    #[test]
    fn test_key_for_unknown_tier_is_none() {
        let (limiter, _, _) = limiter_with(vec![Tier::new(60, 1), Tier::new(3600, 10)], 0);

        assert!(limiter.key_for(IP, ROUTE, 1).is_some());
        assert_eq!(limiter.key_for(IP, ROUTE, 2), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_count_every_request() {
        let tier = Tier::new(3600, 1_000);
        let (limiter, store, _) = limiter_with(vec![tier], 0);
        let limiter = Arc::new(limiter);

        let checks = (0..250).map(|_| {
            let limiter = limiter.clone();
            async move { limiter.check(IP, ROUTE).await.unwrap() }
        });
        let outcomes = futures::future::join_all(checks).await;

        assert!(outcomes.iter().all(Admission::is_allowed));
        assert_eq!(store.count(&limiter.key_for(IP, ROUTE, 0).unwrap()), Some(250));
    }
}
