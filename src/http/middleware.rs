//! Admission middleware.
//!
//! Runs as a route layer so the matched route pattern is known. Every
//! request is checked against the limiter before the handler runs:
//!
//! - allowed: the handler's response is returned untouched
//! - denied: `429` with a fixed body, the handler never runs
//! - store failure: `500`, the handler never runs

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::ratelimit::{Admission, Breach, RateLimiter};

/// Body sent with every 429.
pub const DENIAL_BODY: &str = "Too many request, wait and try again: 429 error";
/// Body sent when the counter store cannot be used.
pub const UNAVAILABLE_BODY: &str = "rate limiter unavailable";
/// Identity used when the connection carries no peer address.
pub const UNKNOWN_IDENTITY: &str = "unknown";
/// Route used when the router supplied no matched pattern.
pub const UNMATCHED_ROUTE: &str = "<unmatched>";

/// Check the request against `limiter` and either run the next stage or
/// answer on its behalf.
pub async fn admission(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(&request);
    let route = matched_route(&request);

    match limiter.check(&identity, &route).await {
        Ok(Admission::Allowed) => next.run(request).await,
        Ok(Admission::Denied(breach)) => {
            warn!(
                identity = %identity,
                route = %route,
                tier = breach.tier_index,
                window_secs = breach.tier.window_secs,
                count = breach.count,
                limit = breach.tier.max_requests,
                "Request denied"
            );
            denial_response(&breach)
        }
        Err(e) => {
            error!(
                identity = %identity,
                route = %route,
                error = %e,
                "Rate limit check failed; rejecting request"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, UNAVAILABLE_BODY).into_response()
        }
    }
}

fn denial_response(breach: &Breach) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, breach.retry_after_secs.to_string())],
        DENIAL_BODY,
    )
        .into_response()
}

fn client_identity(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

fn matched_route(request: &Request) -> String {
    match request.extensions().get::<MatchedPath>() {
        Some(path) => path.as_str().to_string(),
        None => {
            warn!(
                path = %request.uri().path(),
                fallback = UNMATCHED_ROUTE,
                "No matched route pattern; using fallback route"
            );
            UNMATCHED_ROUTE.to_string()
        }
    }
}
