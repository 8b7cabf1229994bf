// ── Diagnostics channel ──
//
// Every access attempt, resolution and enrollment transition is
// published as a record on a broadcast channel. Records carry a
// monotonically increasing sequence number so a consumer that lags
// behind the channel capacity can tell exactly how much it missed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use quirkmesh_api::{ClusterId, OperationKind, StrategyKind, TransportErrorKind};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::enrollment::EnrollmentState;
use crate::model::{DeviceId, ResolutionHints, ResolutionResult};

/// Result of a single transport attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// One transport call made by the accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessAttempt {
    pub device_id: DeviceId,
    pub capability: String,
    pub operation: OperationKind,
    /// Shared by every attempt of one logical operation.
    pub operation_id: Uuid,
    pub strategy_index: usize,
    pub strategy: StrategyKind,
    /// 0 for the first try of a strategy, then 1.. for backoff retries.
    pub retry: u32,
    pub timestamp: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<TransportErrorKind>,
}

/// A resolution and the inputs that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    pub hints: ResolutionHints,
    pub result: ResolutionResult,
    pub timestamp: DateTime<Utc>,
}

/// A state change of an enrollment controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentTransition {
    pub device_id: DeviceId,
    pub cluster: ClusterId,
    pub from: EnrollmentState,
    pub to: EnrollmentState,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum DiagnosticRecord {
    Attempt(AccessAttempt),
    Resolution(ResolutionSnapshot),
    Enrollment(EnrollmentTransition),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencedRecord {
    pub seq: u64,
    #[serde(flatten)]
    pub record: DiagnosticRecord,
}

/// Cloneable publisher handle.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    tx: broadcast::Sender<Arc<SequencedRecord>>,
    seq: Arc<AtomicU64>,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish a record. Never blocks; with no subscribers it is dropped.
    pub fn emit(&self, record: DiagnosticRecord) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(Arc::new(SequencedRecord { seq, record }));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SequencedRecord>> {
        self.tx.subscribe()
    }

    /// Total records emitted so far.
    pub fn emitted(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }
}
