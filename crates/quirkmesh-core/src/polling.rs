// ── Fallback polling ──
//
// When a reporting capability cannot get report configuration through,
// or a security zone has not completed enrollment, its value is
// refreshed by periodic reads instead. Poll tasks never
// touch the transport: they only post ticks to the device worker, which
// runs the read in its own queue. Every few cycles a tick asks the
// worker to retry report configuration; success ends the polling. For
// zones that tick re-sends the enroll response instead, and enrollment
// ends the polling.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PollingConfig;
use crate::model::DeviceId;

/// Work request posted by a poll task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTick {
    pub capability: String,
    /// 1-based cycle counter.
    pub cycle: u32,
    /// Retry report configuration before reading.
    pub reconfigure: bool,
}

/// Running poll loop for one capability. Canceled on drop.
#[derive(Debug)]
pub struct PollTask {
    capability: String,
    interval: Duration,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTask {
    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Poll tasks of one device.
#[derive(Debug)]
pub struct PollingFallback {
    device_id: DeviceId,
    config: PollingConfig,
    ticks: mpsc::Sender<PollTick>,
    parent: CancellationToken,
    tasks: HashMap<String, PollTask>,
}

impl PollingFallback {
    /// `parent` is the device's cancel token; every poll task is a child
    /// of it and stops when the device is removed.
    pub fn new(
        device_id: DeviceId,
        config: PollingConfig,
        ticks: mpsc::Sender<PollTick>,
        parent: CancellationToken,
    ) -> Self {
        Self {
            device_id,
            config,
            ticks,
            parent,
            tasks: HashMap::new(),
        }
    }

    /// Start polling `capability`. Returns `false` if it already is.
    pub fn schedule(&mut self, capability: &str) -> bool {
        if self.tasks.contains_key(capability) {
            return false;
        }
        let interval = self.config.effective_interval();
        let cancel = self.parent.child_token();
        let handle = tokio::spawn(poll_loop(
            capability.to_owned(),
            interval,
            self.config.jitter,
            self.config.reconfigure_every,
            self.ticks.clone(),
            cancel.clone(),
        ));
        info!(
            device = %self.device_id,
            capability,
            interval = ?interval,
            "polling started"
        );
        self.tasks.insert(
            capability.to_owned(),
            PollTask {
                capability: capability.to_owned(),
                interval,
                cancel,
                handle,
            },
        );
        true
    }

    /// Stop polling `capability`. Returns `false` if it was not polled.
    pub fn cancel(&mut self, capability: &str) -> bool {
        let removed = self.tasks.remove(capability).is_some();
        if removed {
            debug!(device = %self.device_id, capability, "polling stopped");
        }
        removed
    }

    pub fn cancel_all(&mut self) {
        self.tasks.clear();
    }

    pub fn is_polling(&self, capability: &str) -> bool {
        self.tasks.contains_key(capability)
    }

    pub fn task(&self, capability: &str) -> Option<&PollTask> {
        self.tasks.get(capability)
    }

    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

async fn poll_loop(
    capability: String,
    interval: Duration,
    jitter: Duration,
    reconfigure_every: u32,
    ticks: mpsc::Sender<PollTick>,
    cancel: CancellationToken,
) {
    let mut cycle = 0_u32;
    loop {
        let delay = interval + sample_jitter(jitter);
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        cycle = cycle.saturating_add(1);
        let tick = PollTick {
            capability: capability.clone(),
            cycle,
            reconfigure: reconfigure_every > 0 && cycle % reconfigure_every == 0,
        };
        // Worker gone means the device is gone.
        if ticks.send(tick).await.is_err() {
            break;
        }
    }
}

/// Uniform delay in `[0, max]`, drawn fresh every cycle so a fleet of
/// devices does not poll in lockstep.
fn sample_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
