use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default number of transfers started per second when rate limiting is enabled.
pub const DEFAULT_TRANSFERS_PER_SECOND: u32 = 2;

/// A shared limiter on how fast transfers are started.
///
/// Cloning is cheap; every clone draws from the same budget.
///
/// ```ignore
/// let limiter = TransferRateLimiter::new(2);
/// limiter.wait().await;
/// pipeline.transfer(&request).await?;
/// ```
#[derive(Clone)]
pub struct TransferRateLimiter {
    inner: Arc<GovernorRateLimiter>,
    per_second: NonZeroU32,
}

impl TransferRateLimiter {
    /// Create a limiter allowing `per_second` transfers per second.
    ///
    /// Zero is treated as one.
    pub fn new(per_second: u32) -> Self {
        let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            per_second,
        }
    }

    #[must_use]
    pub fn per_second(&self) -> u32 {
        self.per_second.get()
    }

    /// Wait until another transfer may start.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

impl std::fmt::Debug for TransferRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferRateLimiter")
            .field("per_second", &self.per_second)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn zero_rate_is_clamped_to_one() {
        assert_eq!(TransferRateLimiter::new(0).per_second(), 1);
        assert_eq!(TransferRateLimiter::new(5).per_second(), 5);
    }

    #[tokio::test]
    async fn burst_within_quota_does_not_wait() {
        let limiter = TransferRateLimiter::new(10);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn clones_share_the_same_budget() {
        let limiter = TransferRateLimiter::new(1);
        let clone = limiter.clone();
        limiter.wait().await;

        let start = Instant::now();
        clone.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
