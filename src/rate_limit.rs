//! Rate limiting for the auth endpoints that reach the token backend.
//!
//! Uses a token bucket algorithm with per-IP tracking.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::{IpExtractor, extract_client_ip};

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

const REFRESH_PER_MIN: u32 = 60;
const REFRESH_BURST: u32 = 20;
const ISSUE_PER_MIN: u32 = 10;
const ISSUE_BURST: u32 = 5;

fn quota(per_minute: u32, burst: u32) -> Quota {
    let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    Quota::per_minute(per_minute).allow_burst(burst)
}

/// Rate limiting configuration for the auth endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for token refresh (60 per minute, burst 20)
    pub refresh: Arc<IpLimiter>,
    /// Per-IP limiter for sign-in and sign-up (10 per minute, burst 5)
    pub issue: Arc<IpLimiter>,
    /// Proxy header to read the client IP from, if any
    pub ip_extractor: Option<IpExtractor>,
}

impl RateLimitConfig {
    /// Create rate limiters with default configuration.
    pub fn new(ip_extractor: Option<IpExtractor>) -> Self {
        Self::with_quotas(
            quota(REFRESH_PER_MIN, REFRESH_BURST),
            quota(ISSUE_PER_MIN, ISSUE_BURST),
            ip_extractor,
        )
    }

    pub fn with_quotas(refresh: Quota, issue: Quota, ip_extractor: Option<IpExtractor>) -> Self {
        Self {
            refresh: Arc::new(RateLimiter::keyed(refresh)),
            issue: Arc::new(RateLimiter::keyed(issue)),
            ip_extractor,
        }
    }

    /// Drop idle per-IP buckets.
    pub fn retain_recent(&self) {
        self.refresh.retain_recent();
        self.issue.retain_recent();
    }
}

fn check(
    config: &RateLimitConfig,
    limiter: &IpLimiter,
    request: &Request,
    message: &'static str,
) -> Result<(), Response> {
    let ip = extract_client_ip(request, config.ip_extractor.as_ref()).map_err(|_| {
        (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response()
    })?;

    limiter
        .check_key(&ip)
        .map_err(|_| (StatusCode::TOO_MANY_REQUESTS, message).into_response())
}

/// Middleware for rate limiting token refresh.
pub async fn rate_limit_refresh(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(
        &config,
        &config.refresh,
        &request,
        "Too many requests. Please try again later.",
    ) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

/// Middleware for rate limiting sign-in and sign-up.
pub async fn rate_limit_issue(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(
        &config,
        &config.issue,
        &request,
        "Too many authentication attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}
