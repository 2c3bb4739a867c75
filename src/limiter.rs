// ===============================
// src/limiter.rs
// ===============================
//
// Minimum-interval gate in front of a rate-limited analysis backend.
//
// One limiter is shared (Arc) by every dispatcher task. `acquire()` takes
// the lock, sleeps out whatever remains of the interval since the previous
// grant, stamps "now" and releases. Only the scheduling decision is
// serialized; the backend call itself happens after the lock is gone.
//

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::metrics::LIMITER_WAIT;

/// Time source for the limiter.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, dur: Duration);
}

/// Tokio timer; honours `tokio::time::pause()` in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}

pub struct RateLimiter {
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(min_interval, Arc::new(TokioClock))
    }

    pub fn with_clock(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { min_interval, clock, last_call: Mutex::new(None) }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for our turn. Returns how long this caller slept.
    pub async fn acquire(&self) -> Duration {
        let mut last = self.last_call.lock().await;

        let mut waited = Duration::ZERO;
        if let Some(prev) = *last {
            let elapsed = self.clock.now().saturating_duration_since(prev);
            if elapsed < self.min_interval {
                waited = self.min_interval - elapsed;
                debug!(wait_ms = waited.as_millis() as u64, "rate limiter: waiting");
                self.clock.sleep(waited).await;
            }
        }
        *last = Some(self.clock.now());

        LIMITER_WAIT.observe(waited.as_secs_f64());
        waited
    }
}
