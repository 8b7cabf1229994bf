// ── Per-device worker ──
//
// One task per device owns everything mutable about that device: the
// accessor and its strategy memo, the enrollment controllers, the poll
// tasks and the alarm reset timers. Work arrives on four queues: a
// priority lane for time-critical enroll requests, the FIFO lane for
// caller operations and inbound reports, the poll lane and the alarm
// lane. Items run one at a time, so transport calls for a device never
// overlap.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use quirkmesh_api::{AttributeValue, ClusterId, OperationKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::event::{InboundEvent, Submission, WorkItem};
use crate::accessor::{AdaptiveAccessor, Operation, OperationOutput};
use crate::alarm::{AlarmExpired, AlarmResetTimers};
use crate::binder::CapabilityBinding;
use crate::enrollment::{
    EnrollmentController, EnrollmentState, ZONE_STATUS_ATTRIBUTE, ZoneStatus,
};
use crate::error::CoreError;
use crate::listener::ListenerRegistry;
use crate::model::{AccessKind, BindFailure, CapabilitySpec, DeviceId, DeviceStatus, ProfileId};
use crate::polling::{PollTick, PollingFallback};
use crate::store::DataStore;

pub(crate) struct DeviceWorker {
    pub(super) device_id: DeviceId,
    pub(super) profile_id: ProfileId,
    pub(super) accessor: AdaptiveAccessor,
    pub(super) capabilities: IndexMap<String, CapabilityBinding>,
    pub(super) enrollments: BTreeMap<ClusterId, EnrollmentController>,
    pub(super) failures: Vec<BindFailure>,
    pub(super) polling: PollingFallback,
    pub(super) alarms: AlarmResetTimers,
    pub(super) store: Arc<DataStore>,
    pub(super) listeners: ListenerRegistry,
    pub(super) proactive_enroll: bool,
    /// Host default; capabilities may override or disable it.
    pub(super) alarm_auto_reset: Option<Duration>,
    pub(super) cancel: CancellationToken,
}

impl DeviceWorker {
    pub(super) async fn run(
        mut self,
        mut priority_rx: mpsc::Receiver<WorkItem>,
        mut work_rx: mpsc::Receiver<WorkItem>,
        mut poll_rx: mpsc::Receiver<PollTick>,
        mut alarm_rx: mpsc::Receiver<AlarmExpired>,
    ) {
        let cancel = self.cancel.clone();
        debug!(device = %self.device_id, "worker started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(item) = priority_rx.recv() => self.handle(item).await,
                Some(item) = work_rx.recv() => self.handle(item).await,
                Some(tick) = poll_rx.recv() => self.on_poll_tick(tick).await,
                Some(expired) = alarm_rx.recv() => self.on_alarm_expired(&expired),
                else => break,
            }
        }

        self.shutdown();
    }

    async fn handle(&mut self, item: WorkItem) {
        match item {
            WorkItem::Startup => self.startup().await,
            WorkItem::Submit(Submission {
                capability,
                operation,
                response_tx,
            }) => {
                let result = self.submit(&capability, operation).await;
                let _ = response_tx.send(result);
            }
            WorkItem::Inbound(event) => self.on_inbound(event).await,
            WorkItem::Invalidate {
                capability,
                response_tx,
            } => {
                let _ = response_tx.send(self.invalidate(capability.as_deref()));
            }
        }
    }

    // ── Startup ──────────────────────────────────────────────────────

    async fn startup(&mut self) {
        for controller in self.enrollments.values_mut() {
            controller.register_listener(&self.listeners);
            if self.proactive_enroll {
                controller
                    .send_proactive(&mut self.accessor, &self.cancel)
                    .await;
            }
        }
        self.publish_status();

        let specs: Vec<(Arc<CapabilitySpec>, bool, bool)> = self
            .capabilities
            .values()
            .map(|b| {
                (
                    Arc::clone(b.spec()),
                    b.wants_reporting(),
                    b.can(OperationKind::Read),
                )
            })
            .collect();

        for (spec, reporting, readable) in specs {
            if self.cancel.is_cancelled() {
                return;
            }
            if spec.requires_enrollment() {
                if spec.attribute_id == ZONE_STATUS_ATTRIBUTE && readable {
                    self.start_zone(&spec).await;
                }
                continue;
            }
            match spec.access {
                AccessKind::Report => {
                    if reporting {
                        self.configure_reporting(&spec).await;
                    } else {
                        self.polling.schedule(&spec.name);
                    }
                    if readable {
                        self.refresh(&spec).await;
                    }
                }
                AccessKind::Read => {
                    if readable {
                        self.refresh(&spec).await;
                    }
                }
                AccessKind::Write => {}
            }
        }
        self.publish_status();
        info!(
            device = %self.device_id,
            profile = %self.profile_id,
            polling = self.polling.len(),
            "device ready"
        );
    }

    /// Enrolled zones push their status. Until then it is read now and
    /// polled.
    async fn start_zone(&mut self, spec: &CapabilitySpec) {
        self.read_zone_status(spec).await;
        if !self.is_enrolled(spec.cluster) {
            self.polling.schedule(&spec.name);
        }
    }

    async fn configure_reporting(&mut self, spec: &CapabilitySpec) {
        let operation = Operation::ConfigureReport(spec.reporting);
        match self.accessor.execute(spec, &operation, &self.cancel).await {
            Ok(_) => debug!(device = %self.device_id, capability = %spec.name, "reporting configured"),
            Err(CoreError::Canceled) => {}
            Err(e) if e.is_access_exhausted() => {
                debug!(device = %self.device_id, capability = %spec.name, error = %e, "reporting unavailable");
                self.polling.schedule(&spec.name);
            }
            Err(e) => warn!(device = %self.device_id, capability = %spec.name, error = %e, "reporting setup failed"),
        }
    }

    /// Read a capability and record the outcome in the store.
    async fn refresh(&mut self, spec: &CapabilitySpec) {
        match self.accessor.execute(spec, &Operation::Read, &self.cancel).await {
            Ok(OperationOutput::Value(value)) => {
                self.store.set_value(&self.device_id, &spec.name, value);
            }
            Ok(OperationOutput::Ack) | Err(CoreError::Canceled) => {}
            Err(e) => self.store.mark_stale(&self.device_id, &spec.name, &e.to_string()),
        }
    }

    // ── Caller operations ────────────────────────────────────────────

    async fn submit(
        &mut self,
        capability: &str,
        operation: Operation,
    ) -> Result<OperationOutput, CoreError> {
        let spec = self
            .capabilities
            .get(capability)
            .map(|b| Arc::clone(b.spec()))
            .ok_or_else(|| CoreError::CapabilityNotFound {
                device_id: self.device_id.clone(),
                capability: capability.to_owned(),
            })?;

        let result = self.accessor.execute(&spec, &operation, &self.cancel).await;

        match (&operation, &result) {
            (Operation::Read, Ok(OperationOutput::Value(value))) if is_zone_status(&spec) => {
                if let Some(status) = ZoneStatus::from_value(value) {
                    self.apply_zone_status(spec.cluster, status);
                }
            }
            (Operation::Read, Ok(OperationOutput::Value(value))) => {
                self.store.set_value(&self.device_id, &spec.name, value.clone());
            }
            (Operation::Write(value), Ok(_)) => {
                self.store.set_value(&self.device_id, &spec.name, value.clone());
            }
            (Operation::ConfigureReport(_), Ok(_)) => {
                if self.polling.cancel(&spec.name) {
                    self.publish_status();
                }
            }
            (Operation::ConfigureReport(_), Err(e))
                if e.is_access_exhausted() && spec.access == AccessKind::Report =>
            {
                if self.polling.schedule(&spec.name) {
                    self.publish_status();
                }
            }
            (Operation::Read, Err(e)) if !matches!(e, CoreError::Canceled) => {
                self.store.mark_stale(&self.device_id, &spec.name, &e.to_string());
            }
            _ => {}
        }
        result
    }

    fn invalidate(&mut self, capability: Option<&str>) -> Result<usize, CoreError> {
        match capability {
            None => Ok(self.accessor.reset()),
            Some(name) if self.capabilities.contains_key(name) => {
                Ok(self.accessor.invalidate(name))
            }
            Some(name) => Err(CoreError::CapabilityNotFound {
                device_id: self.device_id.clone(),
                capability: name.to_owned(),
            }),
        }
    }

    // ── Polling ──────────────────────────────────────────────────────

    async fn on_poll_tick(&mut self, tick: PollTick) {
        if !self.polling.is_polling(&tick.capability) {
            trace!(device = %self.device_id, capability = %tick.capability, "stale poll tick");
            return;
        }
        let Some(spec) = self
            .capabilities
            .get(&tick.capability)
            .map(|b| Arc::clone(b.spec()))
        else {
            self.polling.cancel(&tick.capability);
            return;
        };

        if spec.requires_enrollment() {
            self.poll_zone(&spec, &tick).await;
            return;
        }

        if tick.reconfigure {
            let operation = Operation::ConfigureReport(spec.reporting);
            match self.accessor.execute(&spec, &operation, &self.cancel).await {
                Ok(_) => {
                    self.polling.cancel(&spec.name);
                    info!(
                        device = %self.device_id,
                        capability = %spec.name,
                        cycle = tick.cycle,
                        "reporting recovered, polling stopped"
                    );
                    self.publish_status();
                    return;
                }
                Err(CoreError::Canceled) => return,
                Err(e) => debug!(device = %self.device_id, capability = %spec.name, error = %e, "reporting still unavailable"),
            }
        }

        self.refresh(&spec).await;
    }

    /// Zone polling retries enrollment where configuration retries would
    /// go, then reads the status.
    async fn poll_zone(&mut self, spec: &CapabilitySpec, tick: &PollTick) {
        if tick.reconfigure && self.proactive_enroll {
            if let Some(controller) = self.enrollments.get_mut(&spec.cluster) {
                debug!(device = %self.device_id, cycle = tick.cycle, "retrying enrollment from poll");
                controller
                    .send_proactive(&mut self.accessor, &self.cancel)
                    .await;
            }
            self.publish_status();
        }
        self.read_zone_status(spec).await;
    }

    async fn read_zone_status(&mut self, spec: &CapabilitySpec) {
        match self.accessor.execute(spec, &Operation::Read, &self.cancel).await {
            Ok(OperationOutput::Value(value)) => match ZoneStatus::from_value(&value) {
                Some(status) => self.apply_zone_status(spec.cluster, status),
                None => warn!(device = %self.device_id, capability = %spec.name, %value, "zone status read is not a bitmap"),
            },
            Ok(OperationOutput::Ack) | Err(CoreError::Canceled) => {}
            Err(e) => self.store.mark_stale(&self.device_id, &spec.name, &e.to_string()),
        }
    }

    // ── Inbound traffic ──────────────────────────────────────────────

    async fn on_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::EnrollRequest { cluster } => {
                match self.enrollments.get_mut(&cluster) {
                    Some(controller) => {
                        controller
                            .on_enroll_request(&mut self.accessor, &self.cancel)
                            .await;
                        self.sync_zone_polling(cluster);
                        self.publish_status();
                    }
                    None => debug!(
                        device = %self.device_id,
                        %cluster,
                        "enroll request for a cluster without enrollment"
                    ),
                }
            }
            InboundEvent::ZoneStatusChange { cluster, status } => {
                self.on_zone_status(cluster, &AttributeValue::Bitmap16(status));
            }
            InboundEvent::AttributeReport {
                cluster,
                attribute,
                endpoint,
                value,
            } => {
                if cluster.requires_enrollment() && attribute == ZONE_STATUS_ATTRIBUTE {
                    self.on_zone_status(cluster, &value);
                    return;
                }
                let targets: Vec<String> = self
                    .capabilities
                    .values()
                    .map(|b| b.spec())
                    .filter(|s| {
                        s.cluster == cluster && s.attribute_id == attribute && s.endpoint == endpoint
                    })
                    .map(|s| s.name.clone())
                    .collect();
                if targets.is_empty() {
                    trace!(device = %self.device_id, %cluster, attribute, endpoint, "report for unbound attribute");
                }
                for name in targets {
                    self.store.set_value(&self.device_id, &name, value.clone());
                }
            }
        }
    }

    /// Zone status notifications are applied whatever the enrollment state.
    fn on_zone_status(&mut self, cluster: ClusterId, value: &AttributeValue) {
        let (status, transitioned) = match self.enrollments.get_mut(&cluster) {
            Some(controller) => {
                let before = controller.state();
                let status = controller.on_status(value);
                (status, controller.state() != before)
            }
            None => (ZoneStatus::from_value(value), false),
        };
        if transitioned {
            self.sync_zone_polling(cluster);
            self.publish_status();
        }
        if let Some(status) = status {
            self.apply_zone_status(cluster, status);
        }
    }

    /// Store the alarm flag of every zone capability on `cluster` and
    /// arm or disarm its auto-reset.
    fn apply_zone_status(&mut self, cluster: ClusterId, status: ZoneStatus) {
        trace!(device = %self.device_id, ?status, "zone status");
        let alarm = status.is_alarm();
        for (spec, _) in self.zone_capabilities(cluster) {
            self.store
                .set_value(&self.device_id, &spec.name, AttributeValue::Bool(alarm));
            match self.auto_reset_delay(&spec) {
                Some(delay) if alarm => self.alarms.arm(&spec.name, delay),
                _ => {
                    self.alarms.disarm(&spec.name);
                }
            }
        }
    }

    /// Enrollment ends zone polling; a failed handshake restarts it.
    fn sync_zone_polling(&mut self, cluster: ClusterId) {
        let Some(state) = self
            .enrollments
            .get(&cluster)
            .map(EnrollmentController::state)
        else {
            return;
        };
        for (spec, readable) in self.zone_capabilities(cluster) {
            match state {
                EnrollmentState::Enrolled => {
                    if self.polling.cancel(&spec.name) {
                        info!(device = %self.device_id, capability = %spec.name, "zone enrolled, polling stopped");
                    }
                }
                EnrollmentState::Failed if readable => {
                    self.polling.schedule(&spec.name);
                }
                _ => {}
            }
        }
    }

    fn on_alarm_expired(&mut self, expired: &AlarmExpired) {
        if !self.alarms.expire(expired) {
            trace!(device = %self.device_id, capability = %expired.capability, "superseded alarm reset");
            return;
        }
        info!(device = %self.device_id, capability = %expired.capability, "alarm auto-reset");
        self.store
            .set_value(&self.device_id, &expired.capability, AttributeValue::Bool(false));
    }

    fn auto_reset_delay(&self, spec: &CapabilitySpec) -> Option<Duration> {
        match spec.enrollment.and_then(|e| e.auto_reset_ms) {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => self.alarm_auto_reset.filter(|d| !d.is_zero()),
        }
    }

    /// Zone status capabilities on `cluster`, with their readability.
    fn zone_capabilities(&self, cluster: ClusterId) -> Vec<(Arc<CapabilitySpec>, bool)> {
        self.capabilities
            .values()
            .filter(|b| {
                b.spec().cluster == cluster && b.spec().attribute_id == ZONE_STATUS_ATTRIBUTE
            })
            .map(|b| (Arc::clone(b.spec()), b.can(OperationKind::Read)))
            .collect()
    }

    fn is_enrolled(&self, cluster: ClusterId) -> bool {
        self.enrollments
            .get(&cluster)
            .is_some_and(|c| c.state().is_enrolled())
    }

    // ── Status ───────────────────────────────────────────────────────

    pub(super) fn publish_status(&self) {
        self.store.put_device_status(DeviceStatus {
            device_id: self.device_id.clone(),
            profile_id: self.profile_id.clone(),
            bound: self.capabilities.keys().cloned().collect(),
            bind_failures: self.failures.clone(),
            enrollment: self
                .enrollments
                .iter()
                .map(|(cluster, controller)| (*cluster, controller.state()))
                .collect(),
            polling: self.polling.active().map(str::to_owned).collect(),
        });
    }

    fn shutdown(&mut self) {
        self.polling.cancel_all();
        self.alarms.cancel_all();
        for controller in self.enrollments.values_mut() {
            controller.release();
        }
        debug!(device = %self.device_id, "worker stopped");
    }
}

fn is_zone_status(spec: &CapabilitySpec) -> bool {
    spec.cluster.requires_enrollment() && spec.attribute_id == ZONE_STATUS_ATTRIBUTE
}
