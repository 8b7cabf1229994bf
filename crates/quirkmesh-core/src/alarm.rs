// ── Alarm auto-reset ──
//
// Some zones raise an alarm but never report it clearing. A timer per
// alarmed capability posts an expiry to the device worker, which clears
// the value in its own queue. Re-triggering replaces the timer; each
// timer carries a generation so an expiry that raced a replacement is
// ignored.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::DeviceId;

/// Posted by a timer when its delay elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmExpired {
    pub capability: String,
    pub generation: u64,
}

#[derive(Debug)]
struct AlarmTimer {
    generation: u64,
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

impl Drop for AlarmTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Pending alarm resets of one device.
#[derive(Debug)]
pub struct AlarmResetTimers {
    device_id: DeviceId,
    expired: mpsc::Sender<AlarmExpired>,
    parent: CancellationToken,
    timers: HashMap<String, AlarmTimer>,
    next_generation: u64,
}

impl AlarmResetTimers {
    pub fn new(
        device_id: DeviceId,
        expired: mpsc::Sender<AlarmExpired>,
        parent: CancellationToken,
    ) -> Self {
        Self {
            device_id,
            expired,
            parent,
            timers: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Start (or restart) the reset timer of `capability`.
    pub fn arm(&mut self, capability: &str, delay: Duration) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel = self.parent.child_token();
        let handle = tokio::spawn(expire_after(
            AlarmExpired {
                capability: capability.to_owned(),
                generation,
            },
            delay,
            self.expired.clone(),
            cancel.clone(),
        ));
        debug!(device = %self.device_id, capability, delay = ?delay, "alarm reset armed");
        self.timers.insert(
            capability.to_owned(),
            AlarmTimer {
                generation,
                cancel,
                _handle: handle,
            },
        );
    }

    /// The alarm cleared on its own.
    pub fn disarm(&mut self, capability: &str) -> bool {
        self.timers.remove(capability).is_some()
    }

    /// Consume an expiry. `false` when the timer was replaced or
    /// disarmed after the expiry was posted.
    pub fn expire(&mut self, event: &AlarmExpired) -> bool {
        let current = self
            .timers
            .get(&event.capability)
            .is_some_and(|t| t.generation == event.generation);
        if current {
            self.timers.remove(&event.capability);
        }
        current
    }

    pub fn is_armed(&self, capability: &str) -> bool {
        self.timers.contains_key(capability)
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }
}

async fn expire_after(
    event: AlarmExpired,
    delay: Duration,
    expired: mpsc::Sender<AlarmExpired>,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(delay) => {
            let _ = expired.send(event).await;
        }
    }
}
