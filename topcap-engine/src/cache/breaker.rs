//! Circuit breaker for the cache transport.
//!
//! After `failure_threshold` consecutive transport errors the breaker opens
//! and the cache layer stops calling the transport until `cooldown` has
//! passed on the injected clock. The next allowed call closes it again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::clock::{to_chrono, Clock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Transport calls are allowed.
    Closed,
    /// Transport calls are skipped until the cooldown expires.
    Open { tripped_at: DateTime<Utc> },
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
}

pub struct CacheBreaker {
    inner: Mutex<Inner>,
    cooldown: Duration,
    failure_threshold: u32,
    clock: Arc<dyn Clock>,
}

impl CacheBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
            }),
            cooldown,
            failure_threshold: failure_threshold.max(1),
            clock,
        }
    }

    pub fn is_allowed(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open { tripped_at } => {
                if self.clock.now() - tripped_at >= to_chrono(self.cooldown) {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    tracing::info!("cache transport cooldown over, retrying");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.inner.lock().consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold
            && inner.state == BreakerState::Closed
        {
            inner.state = BreakerState::Open {
                tripped_at: self.clock.now(),
            };
            tracing::warn!(
                failures = inner.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "cache transport disabled after repeated failures"
            );
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;

    fn breaker() -> (CacheBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        (CacheBreaker::new(3, Duration::from_secs(60), clock.clone()), clock)
    }

    #[test]
    fn starts_closed() {
        let (cb, _) = breaker();
        assert!(cb.is_allowed());
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn trips_after_threshold_failures() {
        let (cb, _) = breaker();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_allowed());
        cb.record_failure();
        assert!(!cb.is_allowed());
    }

    #[test]
    fn success_resets_counter() {
        let (cb, _) = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert!(cb.is_allowed());
    }

    #[test]
    fn closes_after_cooldown() {
        let (cb, clock) = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        clock.advance(Duration::from_secs(59));
        assert!(!cb.is_allowed());
        clock.advance(Duration::from_secs(1));
        assert!(cb.is_allowed());
        assert_eq!(cb.state(), BreakerState::Closed);
    }
}
