//! Request pacing and retry backoff for the catalog client.
//!
//! MusicBrainz asks for at most one request per second per client. The
//! limiter enforces a minimum gap between *any* two outbound requests
//! (searches, listings, downloads, and retries alike). Callers queue on a
//! fair async mutex instead of being rejected.

use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between requests.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until a request may be sent, then claim the slot.
    ///
    /// The lock is held across the sleep so concurrent callers are served
    /// one interval apart, in arrival order.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let next = prev + self.min_interval;
            let now = Instant::now();
            if next > now {
                tracing::debug!(
                    target: "catalog",
                    "Rate limiting: sleeping for {:.2}s",
                    (next - now).as_secs_f64()
                );
                tokio::time::sleep_until(next).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Capped exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
    /// Wait after a 429 without `Retry-After`
    pub rate_limit_default: Duration,
    /// Longest `Retry-After` honoured
    pub rate_limit_max: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `min(base * 2^attempt, cap)`
    /// plus up to 25% random jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        let capped = exp.min(self.cap);
        let jitter_ms = (capped.as_millis() / 4) as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        capped + jitter
    }

    /// Wait before retrying a 429, given the server's `Retry-After`.
    pub fn rate_limit_delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.rate_limit_default)
            .min(self.rate_limit_max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_millis(500),
            cap: Duration::from_secs(8),
            rate_limit_default: Duration::from_secs(5),
            rate_limit_max: Duration::from_secs(60),
        }
    }
}
