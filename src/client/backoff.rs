//! Reconnect and status-check budgets.

use std::time::Duration;

/// First reconnect delay
pub const BASE_WAIT_MS: u64 = 1000;
/// Growth factor per reconnect attempt
pub const WAIT_MULTIPLIER: f64 = 1.1;
/// Reconnect attempts before giving up
pub const MAX_ATTEMPTS: u32 = 25;
/// Failed status checks before giving up
pub const MAX_STATUS_CHECKS: u32 = 10;
/// Delay between status checks
pub const STATUS_RETRY: Duration = Duration::from_millis(1000);
/// Delay before the last-resort reload once every budget is spent
pub const GIVE_UP_RELOAD: Duration = Duration::from_millis(5000);

/// Delay of reconnect attempt `k` (zero-based): `1000 * 1.1^k`, rounded.
pub fn delay_for(attempt: u32) -> Duration {
    let attempt = i32::try_from(attempt).unwrap_or(i32::MAX);
    let ms = BASE_WAIT_MS as f64 * WAIT_MULTIPLIER.powi(attempt);
    Duration::from_millis(ms.round() as u64)
}

/// Connection attempt bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAttemptState {
    pub backoff_ms: u64,
    pub attempt_count: u32,
    pub status_check_count: u32,
}

impl Default for ConnectionAttemptState {
    fn default() -> Self {
        Self {
            backoff_ms: BASE_WAIT_MS,
            attempt_count: 0,
            status_check_count: 0,
        }
    }
}

impl ConnectionAttemptState {
    /// Any message received: back to baseline.
    pub fn reset(&mut self) {
        self.backoff_ms = BASE_WAIT_MS;
        self.attempt_count = 0;
    }

    /// Socket closed: delay before the next attempt, `None` once spent.
    pub fn next_reconnect(&mut self) -> Option<Duration> {
        if self.attempt_count >= MAX_ATTEMPTS {
            return None;
        }
        let delay = delay_for(self.attempt_count);
        self.attempt_count += 1;
        self.backoff_ms = delay_for(self.attempt_count).as_millis() as u64;
        Some(delay)
    }

    /// Status check failed: whether another check is allowed.
    pub fn status_failed(&mut self) -> bool {
        self.status_check_count += 1;
        self.status_check_count < MAX_STATUS_CHECKS
    }

    pub fn status_ok(&mut self) {
        self.status_check_count = 0;
    }

    pub fn is_reconnecting(&self) -> bool {
        self.attempt_count > 0
    }
}
