// ── Worker messages ──

use quirkmesh_api::{AttributeValue, ClusterId};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::accessor::{Operation, OperationOutput};
use crate::error::CoreError;

/// Unsolicited traffic from a device, as handed over by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    /// The device asks to be enrolled on a security cluster.
    EnrollRequest { cluster: ClusterId },
    /// Zone status change notification (a 16-bit status bitmap).
    ZoneStatusChange { cluster: ClusterId, status: u16 },
    /// An attribute report.
    AttributeReport {
        cluster: ClusterId,
        attribute: u16,
        #[serde(default = "default_endpoint")]
        endpoint: u8,
        value: AttributeValue,
    },
}

fn default_endpoint() -> u8 {
    1
}

impl InboundEvent {
    /// Enroll requests jump the per-device queue; the device only waits
    /// a few seconds for its answer.
    pub fn is_priority(&self) -> bool {
        matches!(self, Self::EnrollRequest { .. })
    }
}

/// Caller operation plus the channel its result goes back on.
pub(crate) struct Submission {
    pub capability: String,
    pub operation: Operation,
    pub response_tx: oneshot::Sender<Result<OperationOutput, CoreError>>,
}

pub(crate) enum WorkItem {
    /// First item of every worker: configure reporting, initial reads,
    /// proactive enroll responses.
    Startup,
    Submit(Submission),
    Inbound(InboundEvent),
    /// Forget memoized strategies of one capability, or of all of them.
    Invalidate {
        capability: Option<String>,
        response_tx: oneshot::Sender<Result<usize, CoreError>>,
    },
}
