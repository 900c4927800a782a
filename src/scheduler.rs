//! Periodic fallback trigger.
//!
//! File events are best-effort, so the daemon also runs a pass on a fixed
//! interval. The first tick comes one interval after start; the startup pass
//! already covers time zero.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Default fallback interval, in seconds.
pub const DEFAULT_FALLBACK_SECS: u64 = 180;

#[derive(Debug, Clone, Copy)]
pub struct FallbackScheduler {
    interval: Duration,
}

impl FallbackScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Call `tick` every interval until `shutdown` turns true or its sender
    /// is dropped. A tick that overruns the interval delays the next one
    /// rather than causing a catch-up burst.
    pub async fn run<F, Fut>(&self, mut shutdown: watch::Receiver<bool>, mut tick: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("fallback interval elapsed");
                    tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

impl Default for FallbackScheduler {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_FALLBACK_SECS))
    }
}
