//! Coalesces bursts of change notifications into a single pass.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Default quiescence window, in seconds.
pub const DEFAULT_DEBOUNCE_SECS: u64 = 10;

/// Fires once per burst, after `window` has passed without a new event.
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window: Duration,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Consume events until the channel closes, calling `on_fire` whenever
    /// the window elapses after the last event. Each event restarts the
    /// window. A burst still pending when the channel closes is dropped.
    pub async fn run<T, F>(&self, mut events: mpsc::Receiver<T>, mut on_fire: F)
    where
        F: FnMut(),
    {
        let mut pending = false;
        let mut last_event = Instant::now();

        loop {
            let remaining = self.window.saturating_sub(last_event.elapsed());

            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(_) => {
                            pending = true;
                            last_event = Instant::now();
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(remaining), if pending => {
                    pending = false;
                    tracing::debug!(window_secs = self.window.as_secs_f64(), "changes settled");
                    on_fire();
                }
            }
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_DEBOUNCE_SECS))
    }
}
