#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use tollgate::clock::ManualClock;
use tollgate::http::{build_router, AppState};
use tollgate::ratelimit::{CounterStore, MemoryStore, RateLimiter, StoreError, Tier, TierSet};

/// Router wired to an in-memory store and a hand-driven clock.
pub struct Harness {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
    pub limiter: Arc<RateLimiter>,
}

impl Harness {
    pub fn new(tiers: Vec<Tier>, start_secs: u64) -> Self {
        Self::with_state(tiers, start_secs, |state| state)
    }

    pub fn with_state(
        tiers: Vec<Tier>,
        start_secs: u64,
        customize: impl FnOnce(AppState) -> AppState,
    ) -> Self {
        let clock = ManualClock::new(start_secs);
        let store = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
        let limiter = Arc::new(
            RateLimiter::new(store.clone(), TierSet::new(tiers).unwrap())
                .with_clock(Arc::new(clock.clone())),
        );
        let router = build_router(customize(AppState::new(limiter.clone())));

        Self {
            router,
            store,
            clock,
            limiter,
        }
    }

    /// Send a GET from `peer` and return status and body text.
    pub async fn get(&self, path: &str, peer: [u8; 4]) -> (StatusCode, String) {
        let response = self.get_response(path, peer).await;
        let status = response.status();
        (status, body_text(response).await)
    }

    pub async fn get_response(&self, path: &str, peer: [u8; 4]) -> Response<Body> {
        let mut request = Request::builder().uri(path).body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 50000))));

        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Current count of the tier at `tier_index` for `peer` on `route`.
    pub fn count(&self, peer: [u8; 4], route: &str, tier_index: usize) -> Option<u64> {
        let identity = std::net::Ipv4Addr::from(peer).to_string();
        let key = self.limiter.key_for(&identity, route, tier_index)?;
        self.store.count(&key)
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Store that refuses every operation.
#[derive(Debug, Default)]
pub struct DownStore {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CounterStore for DownStore {
    async fn increment_and_expire(&self, _key: &str, _expire_at: u64) -> Result<u64, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}
