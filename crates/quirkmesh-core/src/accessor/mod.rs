// ── Adaptive accessor ──
//
// Runs one logical operation against a device by walking the
// capability's strategy list. Transient link failures are retried on
// the same strategy with backoff; strategy mismatches (unsupported,
// timeout, malformed) advance to the next strategy. The strategy that
// last worked for a capability and operation kind is tried first next
// time; a failed configure-report never erases the read winner.
//
// One accessor per device, owned by that device's worker, so calls
// for a device are already serialized and the memo needs no lock.

mod backoff;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use quirkmesh_api::{
    AttributeValue, ClusterCommand, ClusterRequest, Error as TransportError, OperationKind,
    OperationSet, ReportingConfig, StrategyDescriptor, Transport,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

pub use backoff::BackoffPolicy;

use crate::config::AccessConfig;
use crate::diagnostics::{AccessAttempt, AttemptOutcome, DiagnosticRecord, Diagnostics};
use crate::error::CoreError;
use crate::model::{CapabilitySpec, DeviceId};

// ── Operations ──────────────────────────────────────────────────────

/// A logical operation on a capability.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Read,
    Write(AttributeValue),
    ConfigureReport(ReportingConfig),
    Command(ClusterCommand),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Read => OperationKind::Read,
            Self::Write(_) => OperationKind::Write,
            Self::ConfigureReport(_) => OperationKind::ConfigureReport,
            Self::Command(_) => OperationKind::Command,
        }
    }
}

/// What a successful operation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    Value(AttributeValue),
    Ack,
}

impl OperationOutput {
    pub fn into_value(self) -> Option<AttributeValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Ack => None,
        }
    }
}

// ── AdaptiveAccessor ────────────────────────────────────────────────

type MemoKey = (String, OperationKind);

pub struct AdaptiveAccessor {
    device_id: DeviceId,
    transport: Arc<dyn Transport>,
    /// Declared once by the transport; never rechecked per call.
    supported: OperationSet,
    config: AccessConfig,
    backoff: BackoffPolicy,
    diagnostics: Diagnostics,
    /// (capability, operation kind) -> index of the strategy that last
    /// succeeded.
    memo: HashMap<MemoKey, usize>,
}

impl AdaptiveAccessor {
    pub fn new(
        device_id: DeviceId,
        transport: Arc<dyn Transport>,
        config: AccessConfig,
        diagnostics: Diagnostics,
    ) -> Self {
        let supported = transport.supported_operations();
        let backoff = BackoffPolicy::from(&config);
        Self {
            device_id,
            transport,
            supported,
            config,
            backoff,
            diagnostics,
            memo: HashMap::new(),
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn supported_operations(&self) -> OperationSet {
        self.supported
    }

    pub fn memoized_strategy(&self, capability: &str, kind: OperationKind) -> Option<usize> {
        self.memo.get(&(capability.to_owned(), kind)).copied()
    }

    /// Forget the winning strategies of one capability, for every
    /// operation kind. Returns how many entries were dropped.
    pub fn invalidate(&mut self, capability: &str) -> usize {
        let before = self.memo.len();
        self.memo.retain(|(name, _), _| name != capability);
        let dropped = before - self.memo.len();
        if dropped > 0 {
            debug!(device = %self.device_id, capability, dropped, "strategy memo invalidated");
        }
        dropped
    }

    /// Forget every winning strategy (e.g. after a firmware update).
    pub fn reset(&mut self) -> usize {
        let dropped = self.memo.len();
        self.memo.clear();
        if dropped > 0 {
            debug!(device = %self.device_id, dropped, "strategy memo cleared");
        }
        dropped
    }

    /// Run `operation` on `capability`, cascading through its strategies.
    pub async fn execute(
        &mut self,
        capability: &CapabilitySpec,
        operation: &Operation,
        cancel: &CancellationToken,
    ) -> Result<OperationOutput, CoreError> {
        let kind = operation.kind();
        if !self.supported.contains(kind) {
            return Err(CoreError::UnsupportedOperation {
                device_id: self.device_id.clone(),
                capability: capability.name.clone(),
                operation: kind,
                reason: "transport does not implement this operation".into(),
            });
        }
        if capability.strategy_order.is_empty() {
            return Err(CoreError::UnsupportedOperation {
                device_id: self.device_id.clone(),
                capability: capability.name.clone(),
                operation: kind,
                reason: "capability declares no strategies".into(),
            });
        }

        let memo_key = (capability.name.clone(), kind);
        let operation_id = Uuid::new_v4();
        let mut last_error: Option<TransportError> = None;
        let mut all_transient = true;

        for index in self.strategy_order(capability, kind) {
            let Some(strategy) = capability.strategy_order.get(index) else {
                continue;
            };
            let mut retry = 0_u32;
            loop {
                if cancel.is_cancelled() {
                    return Err(CoreError::Canceled);
                }

                let result = self.attempt(capability, strategy, operation).await;
                self.record(capability, kind, operation_id, index, strategy, retry, &result);

                match result {
                    Ok(output) => {
                        if self.memo.insert(memo_key.clone(), index) != Some(index) {
                            debug!(
                                device = %self.device_id,
                                capability = %capability.name,
                                operation = %kind,
                                strategy = %strategy.kind,
                                index,
                                "strategy memoized"
                            );
                        }
                        return Ok(output);
                    }
                    Err(err) if err.is_transient() && retry < self.config.max_retries => {
                        let delay = self.backoff.delay(retry);
                        trace!(
                            device = %self.device_id,
                            capability = %capability.name,
                            error = %err,
                            ?delay,
                            "transient failure, backing off"
                        );
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => return Err(CoreError::Canceled),
                            () = tokio::time::sleep(delay) => {}
                        }
                        retry += 1;
                    }
                    Err(err) => {
                        debug!(
                            device = %self.device_id,
                            capability = %capability.name,
                            strategy = %strategy.kind,
                            error = %err,
                            "strategy exhausted"
                        );
                        all_transient &= err.is_transient();
                        last_error = Some(err);
                        break;
                    }
                }
            }
        }

        self.memo.remove(&memo_key);
        let err = last_error.unwrap_or(TransportError::Unsupported {
            cluster: capability.cluster,
            detail: "no usable strategy".into(),
        });
        let terminal =
            CoreError::from_transport(&self.device_id, &capability.name, kind, &err, all_transient);
        warn!(
            device = %self.device_id,
            capability = %capability.name,
            operation = %kind,
            error = %terminal,
            "all strategies failed"
        );
        Err(terminal)
    }

    /// Memoized strategy first, then the declared order.
    fn strategy_order(&self, capability: &CapabilitySpec, kind: OperationKind) -> Vec<usize> {
        let len = capability.strategy_order.len();
        let memoized = self.memoized_strategy(&capability.name, kind);
        match memoized.filter(|&i| i < len) {
            Some(first) => std::iter::once(first)
                .chain((0..len).filter(|&i| i != first))
                .collect(),
            None => (0..len).collect(),
        }
    }

    async fn attempt(
        &self,
        capability: &CapabilitySpec,
        strategy: &StrategyDescriptor,
        operation: &Operation,
    ) -> Result<OperationOutput, TransportError> {
        let timeout = strategy.timeout_or(self.config.attempt_timeout);
        let request = ClusterRequest {
            endpoint: strategy.endpoint.unwrap_or(capability.endpoint),
            cluster: capability.cluster,
            attribute: capability.attribute_id,
            strategy: strategy.clone(),
            timeout,
        };

        let call = async {
            match operation {
                Operation::Read => self
                    .transport
                    .read_attribute(&request)
                    .await
                    .map(OperationOutput::Value),
                Operation::Write(value) => self
                    .transport
                    .write_attribute(&request, value)
                    .await
                    .map(|()| OperationOutput::Ack),
                Operation::ConfigureReport(config) => self
                    .transport
                    .configure_reporting(&request, config)
                    .await
                    .map(|()| OperationOutput::Ack),
                Operation::Command(command) => self
                    .transport
                    .invoke_command(&request, command)
                    .await
                    .map(|()| OperationOutput::Ack),
            }
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        capability: &CapabilitySpec,
        operation: OperationKind,
        operation_id: Uuid,
        strategy_index: usize,
        strategy: &StrategyDescriptor,
        retry: u32,
        result: &Result<OperationOutput, TransportError>,
    ) {
        let (outcome, error_kind) = match result {
            Ok(_) => (AttemptOutcome::Success, None),
            Err(e) => (AttemptOutcome::Failure, Some(e.kind())),
        };
        self.diagnostics
            .emit(DiagnosticRecord::Attempt(AccessAttempt {
                device_id: self.device_id.clone(),
                capability: capability.name.clone(),
                operation,
                operation_id,
                strategy_index,
                strategy: strategy.kind,
                retry,
                timestamp: Utc::now(),
                outcome,
                error_kind,
            }));
    }
}

impl std::fmt::Debug for AdaptiveAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveAccessor")
            .field("device_id", &self.device_id)
            .field("supported", &self.supported)
            .field("memo", &self.memo)
            .finish_non_exhaustive()
    }
}
