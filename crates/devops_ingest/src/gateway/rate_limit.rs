use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::http::HttpResponse;

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default outbound budget. Azure DevOps throttles on a sliding window of
/// "throughput units"; 10 rps stays well clear of it for a single connector.
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

/// Fallback wait when a 429 arrives without a usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// A shared outbound call budget.
///
/// Cloning shares the budget, so every call site of one connector instance
/// (including spawned comment fetches and retries) draws from the same quota.
///
/// # Example
///
/// ```ignore
/// use devops_ingest::gateway::ApiRateLimiter;
///
/// let limiter = ApiRateLimiter::new(10); // 10 requests per second
///
/// // Before each API call:
/// limiter.wait().await;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a new rate limiter with the specified requests per second.
    ///
    /// A value of 0 is treated as 1.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));

        Self {
            inner: Arc::new(rate_limiter),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter").finish_non_exhaustive()
    }
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
///
/// HTTP-date values are not used by Azure DevOps and yield `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// How long to wait after a 429 response.
pub fn retry_after_from_response(response: &HttpResponse, fallback: Duration) -> Duration {
    response
        .header("Retry-After")
        .and_then(parse_retry_after)
        .unwrap_or(fallback)
}
