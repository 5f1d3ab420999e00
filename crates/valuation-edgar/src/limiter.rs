//! Request rate limiting.
//!
//! [`TokenBucket`] releases permits at a fixed interval with no burst
//! allowance, so any rolling one-second window sees at most `rate`
//! dispatches. A permit is reserved under the lock and waited for outside
//! it: a caller cancelled while waiting forfeits its slot and never lets a
//! later caller jump ahead.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Gate every outbound request passes through.
///
/// One limiter is shared by every client of a process; tests inject
/// [`Unlimited`] or their own deterministic fake.
#[async_trait]
pub trait RateLimiter: Send + Sync + Debug {
    /// Waits until the caller may dispatch one request.
    async fn acquire(&self);
}

/// Fixed-rate permit dispenser.
#[derive(Debug)]
pub struct TokenBucket {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl TokenBucket {
    /// Creates a bucket releasing `per_second` permits per second.
    ///
    /// A rate of zero is treated as one.
    #[must_use]
    pub fn new(per_second: u32) -> Self {
        let per_second = u64::from(per_second.max(1));
        // Rounded up so that `per_second` intervals never add up to less than a second.
        let interval = Duration::from_nanos(1_000_000_000_u64.div_ceil(per_second));
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Spacing between consecutive permits.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    async fn reserve(&self) -> Instant {
        let mut next = self.next_slot.lock().await;
        let slot = (*next).max(Instant::now());
        *next = slot + self.interval;
        slot
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn acquire(&self) {
        let slot = self.reserve().await;
        sleep_until(slot).await;
    }
}

/// Limiter that never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn acquire(&self) {}
}
