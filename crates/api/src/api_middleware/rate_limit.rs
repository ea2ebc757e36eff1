//! Per-IP rate limiting on mutating endpoints (§4.10), backed by the same
//! `Cache` the Query Service uses for reads rather than a separate counter
//! store. The client identity comes from the `request_id` middleware's
//! enrichment (`RequestContext::source_ip`), which already applies the
//! `x-forwarded-for`-first extraction policy — this middleware does not parse
//! headers itself.

use axum::{extract::Request, extract::State, middleware::Next, response::Response};
use ipwatch_core::error::RequestContext;
use ipwatch_core::{Error, ErrorCode};
use std::time::Duration;

use crate::{error::ApiError, state::AppState};

use super::request_id::RequestIdExt;

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client_id = request
        .source_ip()
        .map(str::to_string)
        .or_else(|| request.extensions().get::<RequestContext>().and_then(|ctx| ctx.source_ip.clone()))
        .unwrap_or_else(|| "unknown".to_string());

    let key = format!("ratelimit:{client_id}");
    let window = Duration::from_secs(state.config.cache.rate_limit_window_seconds);
    let count = state.cache.increment(&key, window);

    if count > state.config.cache.rate_limit_requests as u64 {
        return Err(Error::new(ErrorCode::RateLimitExceeded, "rate limit exceeded, try again later").into());
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use ipwatch_core::Cache;
    use std::time::Duration;

    /// Exercises the same increment-against-window arithmetic the middleware
    /// applies, without needing a full `AppState` (which would require a live
    /// database pool to construct `Store`).
    #[test]
    fn counter_rejects_once_the_configured_limit_is_exceeded() {
        let cache = Cache::new();
        let limit: u64 = 2;
        let window = Duration::from_secs(60);

        let mut allowed = Vec::new();
        for _ in 0..3 {
            let count = cache.increment("ratelimit:203.0.113.1", window);
            allowed.push(count <= limit);
        }

        assert_eq!(allowed, vec![true, true, false]);
    }

    #[test]
    fn distinct_clients_have_independent_counters() {
        let cache = Cache::new();
        let window = Duration::from_secs(60);

        assert_eq!(cache.increment("ratelimit:a", window), 1);
        assert_eq!(cache.increment("ratelimit:b", window), 1);
        assert_eq!(cache.increment("ratelimit:a", window), 2);
    }
}
