//! Fixed-window dispatch limiter.

use std::time::{Duration, Instant};

/// Allows `limit` dispatches per `window`; later ones wait for the next window.
#[derive(Debug)]
pub struct FixedWindow {
    limit: u32,
    window: Duration,
    window_start: Option<Instant>,
    count: u32,
}

impl FixedWindow {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            window_start: None,
            count: 0,
        }
    }

    /// Take a slot at `now`, or return how long until the next window opens.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        let start = match self.window_start {
            Some(start) if now.duration_since(start) < self.window => start,
            _ => {
                self.window_start = Some(now);
                self.count = 0;
                now
            }
        };
        if self.count < self.limit {
            self.count += 1;
            Ok(())
        } else {
            Err(self.window.saturating_sub(now.duration_since(start)))
        }
    }
}
