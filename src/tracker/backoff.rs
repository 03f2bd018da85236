use std::time::Duration;

/// Retry schedule for UDP tracker exchanges.
///
/// Attempt `n` (from zero) waits `base * 2^n` for an answer; after
/// `max_retries` attempts the tracker is given up on.
///
/// ```
/// use rswarm::tracker::Backoff;
/// use std::time::Duration;
///
/// let backoff = Backoff::new(Duration::from_secs(15), 8);
/// assert_eq!(backoff.delay(0), Duration::from_secs(15));
/// assert_eq!(backoff.delay(3), Duration::from_secs(120));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max_retries: u32,
}

impl Backoff {
    pub const fn new(base: Duration, max_retries: u32) -> Self {
        Self { base, max_retries }
    }

    /// How long attempt `attempt` waits. Saturates instead of overflowing.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(attempt))
    }
}
