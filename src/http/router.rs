//! Route table and shared handler state.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::warn;

use super::middleware::admission;
use super::reports::{self, ReportSource};
use crate::ratelimit::RateLimiter;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub reports: Option<Arc<dyn ReportSource>>,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            reports: None,
        }
    }

    pub fn with_reports(mut self, reports: Arc<dyn ReportSource>) -> Self {
        self.reports = Some(reports);
        self
    }
}

/// Build the application router.
///
/// Every route registered before the admission layer is rate limited;
/// `/health` is registered after it and is not.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(reports::index))
        .route("/events/hourly", get(reports::events_hourly))
        .route("/events/daily", get(reports::events_daily))
        .route("/stats/hourly", get(reports::stats_hourly))
        .route("/stats/daily", get(reports::stats_daily))
        .route("/poi", get(reports::poi))
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            admission,
        ))
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    match state.limiter.store().ping().await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "counter store unreachable").into_response()
        }
    }
}
