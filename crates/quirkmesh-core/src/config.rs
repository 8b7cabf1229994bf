// ── Runtime host configuration ──
//
// Tuning for retries, polling and enrollment. Built by the config
// crate (or by hand in tests) and passed to `DeviceHost`; core never
// reads config files.

use std::time::Duration;

/// Retry and timeout tuning for the adaptive accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessConfig {
    /// Attempt-level timeout when a strategy does not override it.
    pub attempt_timeout: Duration,
    /// Retries of the same strategy after a transient network failure.
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry.
    pub base_backoff: Duration,
    /// Upper bound for a single backoff delay.
    pub max_backoff: Duration,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(5),
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

/// Fallback polling for capabilities whose report configuration failed
/// and for zones awaiting enrollment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfig {
    pub interval: Duration,
    /// Random delay in `[0, jitter]` added to every cycle.
    pub jitter: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Retry report configuration every N poll cycles. 0 disables it.
    pub reconfigure_every: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            jitter: Duration::from_secs(30),
            min_interval: Duration::from_secs(5 * 60),
            max_interval: Duration::from_secs(60 * 60),
            reconfigure_every: 4,
        }
    }
}

impl PollingConfig {
    /// Configured interval clamped into `[min_interval, max_interval]`.
    pub fn effective_interval(&self) -> Duration {
        let upper = self.max_interval.max(self.min_interval);
        self.interval.max(self.min_interval).min(upper)
    }
}

/// Zone enrollment parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentConfig {
    /// Zone id handed out when the capability does not pin one.
    pub zone_id: u8,
    /// Send the enroll response unprompted once the device is bound.
    pub proactive_response: bool,
    /// IEEE address of this host. When set, it is written to the zone's
    /// CIE address attribute and verified before the enroll response.
    pub cie_address: Option<u64>,
    /// Clear a zone alarm this long after it was raised, for sensors
    /// that never report the alarm ending. Capabilities may override it.
    pub alarm_auto_reset: Option<Duration>,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            zone_id: 10,
            proactive_response: true,
            cie_address: None,
            alarm_auto_reset: None,
        }
    }
}

/// Everything a `DeviceHost` needs at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub access: AccessConfig,
    pub polling: PollingConfig,
    pub enrollment: EnrollmentConfig,
    /// Capacity of each device's FIFO work queue.
    pub queue_capacity: usize,
    /// Diagnostics records buffered per subscriber before it lags.
    pub diagnostics_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            access: AccessConfig::default(),
            polling: PollingConfig::default(),
            enrollment: EnrollmentConfig::default(),
            queue_capacity: 64,
            diagnostics_capacity: 1024,
        }
    }
}
