//! Batch throttle shared by every worker of a run.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;
use tokio::time::Instant;

/// Governor clock driven by tokio time, so paused-clock tests control it.
#[derive(Debug, Clone)]
struct TokioClock {
    origin: Instant,
}

impl Clock for TokioClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        Nanos::from(self.origin.elapsed())
    }
}

type DirectLimiter =
    governor::RateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<Nanos>>;

/// GCRA limiter with a burst of one.
///
/// Grants are spaced by at least `1s / limit` (rounded up to the next
/// nanosecond), so at most `limit` acquisitions fall in any rolling
/// one-second window. A limit of 0 disables throttling.
pub struct RateLimiter {
    clock: TokioClock,
    inner: Option<DirectLimiter>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("unlimited", &self.is_unlimited())
            .finish_non_exhaustive()
    }
}

fn quota(batches_per_second: NonZeroU32) -> Option<Quota> {
    let period = 1_000_000_000_u64.div_ceil(u64::from(batches_per_second.get()));
    Quota::with_period(Duration::from_nanos(period)).map(|q| q.allow_burst(NonZeroU32::MIN))
}

impl RateLimiter {
    #[must_use]
    pub fn new(batches_per_second: u32) -> Self {
        let clock = TokioClock {
            origin: Instant::now(),
        };
        let inner = NonZeroU32::new(batches_per_second)
            .and_then(quota)
            .map(|quota| governor::RateLimiter::direct_with_clock(quota, &clock));
        Self { clock, inner }
    }

    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.inner.is_none()
    }

    /// Wait until a grant is available and take it.
    pub async fn acquire(&self) {
        let Some(limiter) = &self.inner else {
            return;
        };
        while let Err(not_until) = limiter.check() {
            tokio::time::sleep(not_until.wait_time_from(self.clock.now())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const WINDOW: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn unlimited_never_waits() {
        let limiter = RateLimiter::new(0);
        let start = Instant::now();
        for _ in 0..10_000 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(limiter.is_unlimited());
    }

    #[tokio::test(start_paused = true)]
    async fn grants_are_spaced_by_the_period() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        let mut previous = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
            let now = Instant::now();
            assert!(now.duration_since(previous) >= Duration::from_millis(200));
            previous = now;
        }
        assert!(start.elapsed() >= WINDOW);
        assert!(!limiter.is_unlimited());
    }

    #[tokio::test(start_paused = true)]
    async fn no_window_exceeds_limit() {
        // 1s / 7 is not a whole number of nanoseconds.
        let limit = 7;
        let limiter = RateLimiter::new(limit);
        let mut granted = Vec::new();
        for _ in 0..50 {
            limiter.acquire().await;
            granted.push(Instant::now());
        }
        let limit = limit as usize;
        for pair in granted.windows(limit + 1) {
            assert!(pair[limit].duration_since(pair[0]) >= WINDOW);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shared_across_tasks() {
        let limiter = Arc::new(RateLimiter::new(4));
        let start = Instant::now();
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..3 {
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move {
                for _ in 0..4 {
                    limiter.acquire().await;
                }
            });
        }
        while tasks.join_next().await.is_some() {}
        // 12 grants spaced 250ms apart.
        assert!(start.elapsed() >= Duration::from_millis(2_750));
    }
}
