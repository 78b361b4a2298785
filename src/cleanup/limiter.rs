//! Run-scoped request pacing.
//!
//! One limiter is constructed per run and shared by every executor worker,
//! so the homeserver sees at most one dispatched call per configured
//! interval no matter how wide the worker pool is. Per-worker limiters
//! would multiply the effective rate, which is exactly the failure mode
//! this guards against.

use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

/// Enforces a minimum interval between dispatched calls.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// A limiter with the given minimum interval between calls.
    /// A zero interval disables pacing.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// A limiter that never delays.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Wait until a dispatch slot is available.
    ///
    /// Slots are reserved under the lock, so concurrent callers line up
    /// one interval apart instead of stampeding when the lock frees.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let wait = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(at) if at > now => at,
                _ => now,
            };
            *next_slot = Some(slot + self.min_interval);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}
