// Reconnect backoff policy for the balance stream.

use std::time::Duration;

/// Default delay before the first reconnect.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Ceiling on any single reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(15_000);

/// Number of reconnects attempted after consecutive failures before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Bounded exponential backoff: `min(initial_delay * 2^attempt, max_delay)`
/// for `attempt < max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait before reconnect number `attempt` (zero-based), or `None`
    /// once the retry budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}
