//! Retry policy for contended writes.

use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff with uniform jitter.
///
/// The only contended write is the shared strings table, where concurrent
/// workers inserting overlapping values deadlock. The insert is idempotent,
/// so retrying is always safe; the bound exists so a genuinely broken
/// connection fails the chunk instead of spinning forever.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(900),
        }
    }
}

impl RetryPolicy {
    /// Sleep duration before retry number `attempt` (1-based): uniform
    /// between the base delay and an exponentially growing, capped ceiling.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;
        let shift = attempt.saturating_sub(1).min(16);
        let ceiling = base.saturating_mul(1 << shift).min(cap).max(base);
        let millis = rand::rng().random_range(base..=ceiling);
        Duration::from_millis(millis)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}
