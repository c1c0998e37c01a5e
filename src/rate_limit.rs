/// Request throttling per client address
///
/// Separate from the login ban tracker: this caps raw request rate for every
/// route, the ban tracker only counts failed passwords.
use crate::{
    api::middleware::{client_ip, peer_addr},
    config::RateLimitConfig,
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter as GovernorLimiter};
use std::{num::NonZeroU32, sync::Arc};

pub const THROTTLED_MESSAGE: &str = "Too many requests. Please slow down.";

/// Keyed limiter; `None` when throttling is disabled
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Option<Arc<DefaultKeyedRateLimiter<String>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self { limiter: None };
        }

        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: Some(Arc::new(GovernorLimiter::keyed(quota))),
        }
    }

    /// Spend one request for `key`
    pub fn check(&self, key: &str) -> AppResult<()> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        limiter
            .check_key(&key.to_string())
            .map_err(|_| AppError::RateLimited(THROTTLED_MESSAGE.to_string()))
    }

    /// Forget addresses whose buckets have refilled
    pub fn prune(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(
        request.headers(),
        peer_addr(request.extensions()),
        ctx.config.service.trust_proxy_headers,
    );

    if let Err(e) = ctx.rate_limiter.check(&ip) {
        tracing::warn!(ip, path = %request.uri().path(), "Request throttled");
        return Err(e);
    }

    Ok(next.run(request).await)
}
