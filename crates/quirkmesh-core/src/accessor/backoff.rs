// ── Retry backoff ──

use std::time::Duration;

use crate::config::AccessConfig;

/// Exponential backoff: `base * 2^retry`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2_u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max))
    }
}

impl From<&AccessConfig> for BackoffPolicy {
    fn from(config: &AccessConfig) -> Self {
        Self::new(config.base_backoff, config.max_backoff)
    }
}
