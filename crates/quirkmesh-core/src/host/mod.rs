// ── Device host ──
//
// Lifecycle of paired devices: resolve a profile, bind capabilities,
// start the per-device worker, route caller operations and inbound
// traffic to it, and tear everything down on removal.

mod event;
mod worker;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quirkmesh_api::Transport;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use event::InboundEvent;

use self::event::{Submission, WorkItem};
use self::worker::DeviceWorker;
use crate::accessor::{AdaptiveAccessor, Operation, OperationOutput};
use crate::alarm::AlarmResetTimers;
use crate::binder::CapabilityBinder;
use crate::config::HostConfig;
use crate::diagnostics::{DiagnosticRecord, Diagnostics, ResolutionSnapshot, SequencedRecord};
use crate::error::CoreError;
use crate::listener::ListenerRegistry;
use crate::model::{
    BindFailure, CapabilityRecord, CapabilityState, DeviceId, DeviceStatus, Identifier, ProfileId,
    ResolutionHints, ResolutionResult,
};
use crate::polling::PollingFallback;
use crate::registry::FingerprintRegistry;
use crate::resolver::Resolver;
use crate::store::DataStore;
use crate::stream::SnapshotStream;

const PRIORITY_CHANNEL_SIZE: usize = 8;
const POLL_CHANNEL_SIZE: usize = 16;
const ALARM_CHANNEL_SIZE: usize = 8;

/// What `add_device` bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub device_id: DeviceId,
    pub profile_id: ProfileId,
    pub bound: Vec<String>,
    pub failures: Vec<BindFailure>,
}

/// Entry point for consumers.
///
/// Cheaply cloneable via `Arc<HostInner>`. Dropping the last clone
/// cancels every device worker.
#[derive(Clone)]
pub struct DeviceHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    config: HostConfig,
    resolver: Resolver,
    binder: CapabilityBinder,
    store: Arc<DataStore>,
    diagnostics: Diagnostics,
    listeners: ListenerRegistry,
    devices: DashMap<DeviceId, DeviceHandle>,
    cancel: CancellationToken,
}

impl Drop for HostInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct DeviceHandle {
    profile_id: ProfileId,
    priority_tx: mpsc::Sender<WorkItem>,
    work_tx: mpsc::Sender<WorkItem>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DeviceHost {
    pub fn new(registry: Arc<FingerprintRegistry>, config: HostConfig) -> Self {
        let diagnostics = Diagnostics::new(config.diagnostics_capacity);
        let binder = CapabilityBinder::new(config.enrollment.clone(), diagnostics.clone());

        Self {
            inner: Arc::new(HostInner {
                resolver: Resolver::new(registry),
                binder,
                store: Arc::new(DataStore::new()),
                diagnostics,
                listeners: ListenerRegistry::new(),
                devices: DashMap::new(),
                cancel: CancellationToken::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<FingerprintRegistry> {
        self.inner.resolver.registry()
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    // ── Resolution ───────────────────────────────────────────────────

    /// Resolve without adding a device (pairing previews, audits).
    pub fn resolve(
        &self,
        identifier: &Identifier,
        hints: Option<&ResolutionHints>,
    ) -> ResolutionResult {
        self.resolve_for(None, identifier, hints)
    }

    fn resolve_for(
        &self,
        device_id: Option<&DeviceId>,
        identifier: &Identifier,
        hints: Option<&ResolutionHints>,
    ) -> ResolutionResult {
        let result = self.inner.resolver.resolve(identifier, hints);
        self.inner
            .diagnostics
            .emit(DiagnosticRecord::Resolution(ResolutionSnapshot {
                device_id: device_id.cloned(),
                hints: hints.cloned().unwrap_or_default(),
                result: result.clone(),
                timestamp: Utc::now(),
            }));
        result
    }

    // ── Device lifecycle ─────────────────────────────────────────────

    /// Resolve, bind and start a device.
    ///
    /// Fails with [`CoreError::AmbiguousResolution`] (carrying the
    /// candidates) or [`CoreError::NoMatchingProfile`] when resolution
    /// does not settle on one profile; the caller may then pick a
    /// candidate and use [`add_device_with_profile`](Self::add_device_with_profile).
    pub fn add_device(
        &self,
        device_id: DeviceId,
        identifier: &Identifier,
        hints: Option<&ResolutionHints>,
        transport: Arc<dyn Transport>,
    ) -> Result<DeviceSummary, CoreError> {
        if self.inner.devices.contains_key(&device_id) {
            return Err(CoreError::DeviceExists { device_id });
        }
        let profile_id = self
            .resolve_for(Some(&device_id), identifier, hints)
            .into_selection()?;
        self.add_device_with_profile(device_id, &profile_id, transport)
    }

    /// Bind and start a device against an explicitly chosen profile.
    pub fn add_device_with_profile(
        &self,
        device_id: DeviceId,
        profile_id: &ProfileId,
        transport: Arc<dyn Transport>,
    ) -> Result<DeviceSummary, CoreError> {
        let inner = &self.inner;
        let profile = inner
            .resolver
            .registry()
            .profile(profile_id)
            .ok_or_else(|| CoreError::ProfileNotFound {
                profile_id: profile_id.clone(),
            })?;

        let Entry::Vacant(slot) = inner.devices.entry(device_id.clone()) else {
            return Err(CoreError::DeviceExists { device_id });
        };

        let accessor = AdaptiveAccessor::new(
            device_id.clone(),
            transport,
            inner.config.access.clone(),
            inner.diagnostics.clone(),
        );
        let bindings = inner
            .binder
            .bind(&device_id, profile, accessor.supported_operations());

        for name in bindings.capabilities.keys() {
            inner.store.init_capability(&device_id, name);
        }

        let (priority_tx, priority_rx) = mpsc::channel(PRIORITY_CHANNEL_SIZE);
        let (work_tx, work_rx) = mpsc::channel(inner.config.queue_capacity.max(1));
        let (poll_tx, poll_rx) = mpsc::channel(POLL_CHANNEL_SIZE);
        let (alarm_tx, alarm_rx) = mpsc::channel(ALARM_CHANNEL_SIZE);
        let cancel = inner.cancel.child_token();

        let summary = DeviceSummary {
            device_id: device_id.clone(),
            profile_id: profile.id.clone(),
            bound: bindings.capabilities.keys().cloned().collect(),
            failures: bindings.failures.clone(),
        };

        let worker = DeviceWorker {
            device_id: device_id.clone(),
            profile_id: bindings.profile_id,
            accessor,
            capabilities: bindings.capabilities,
            enrollments: bindings.enrollments,
            failures: bindings.failures,
            polling: PollingFallback::new(
                device_id.clone(),
                inner.config.polling.clone(),
                poll_tx,
                cancel.clone(),
            ),
            alarms: AlarmResetTimers::new(device_id.clone(), alarm_tx, cancel.clone()),
            store: Arc::clone(&inner.store),
            listeners: inner.listeners.clone(),
            proactive_enroll: inner.config.enrollment.proactive_response,
            alarm_auto_reset: inner.config.enrollment.alarm_auto_reset,
            cancel: cancel.clone(),
        };
        worker.publish_status();

        work_tx
            .try_send(WorkItem::Startup)
            .map_err(|e| CoreError::Internal(format!("startup not queued: {e}")))?;
        let task = tokio::spawn(worker.run(priority_rx, work_rx, poll_rx, alarm_rx));

        slot.insert(DeviceHandle {
            profile_id: summary.profile_id.clone(),
            priority_tx,
            work_tx,
            cancel,
            task,
        });

        info!(
            device = %device_id,
            profile = %summary.profile_id,
            bound = summary.bound.len(),
            failed = summary.failures.len(),
            "device added"
        );
        Ok(summary)
    }

    /// Stop a device's worker and forget its state.
    ///
    /// Pending operations fail with [`CoreError::Canceled`]; an in-flight
    /// transport call is allowed to finish or time out first.
    pub async fn remove_device(&self, device_id: &DeviceId) -> Result<(), CoreError> {
        let (_, handle) =
            self.inner
                .devices
                .remove(device_id)
                .ok_or_else(|| CoreError::DeviceNotFound {
                    device_id: device_id.clone(),
                })?;
        let DeviceHandle {
            profile_id,
            priority_tx,
            work_tx,
            cancel,
            task,
        } = handle;

        cancel.cancel();
        drop(priority_tx);
        drop(work_tx);
        if let Err(e) = task.await {
            warn!(device = %device_id, error = %e, "device worker ended abnormally");
        }

        self.inner.store.remove_device(device_id);
        info!(device = %device_id, profile = %profile_id, "device removed");
        Ok(())
    }

    /// Remove every device.
    pub async fn shutdown(&self) {
        for device_id in self.device_ids() {
            if let Err(e) = self.remove_device(&device_id).await {
                debug!(device = %device_id, error = %e, "already removed");
            }
        }
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Queue an operation on a device and wait for its outcome.
    ///
    /// Operations on one device run in submission order.
    pub async fn submit(
        &self,
        device_id: &DeviceId,
        capability: &str,
        operation: Operation,
    ) -> Result<OperationOutput, CoreError> {
        let work_tx = self.sender(device_id, false)?;
        let (response_tx, response_rx) = oneshot::channel();

        work_tx
            .send(WorkItem::Submit(Submission {
                capability: capability.to_owned(),
                operation,
                response_tx,
            }))
            .await
            .map_err(|_| CoreError::Canceled)?;

        response_rx.await.map_err(|_| CoreError::Canceled)?
    }

    /// Forget the strategies memoized for `capability`, or for every
    /// capability of the device when `None`, so the next operation walks
    /// the declared order again (after a firmware update, say).
    ///
    /// Runs in the device's queue behind pending operations. Returns the
    /// number of memo entries dropped.
    pub async fn invalidate_strategies(
        &self,
        device_id: &DeviceId,
        capability: Option<&str>,
    ) -> Result<usize, CoreError> {
        let work_tx = self.sender(device_id, false)?;
        let (response_tx, response_rx) = oneshot::channel();

        work_tx
            .send(WorkItem::Invalidate {
                capability: capability.map(str::to_owned),
                response_tx,
            })
            .await
            .map_err(|_| CoreError::Canceled)?;

        response_rx.await.map_err(|_| CoreError::Canceled)?
    }

    /// Hand inbound device traffic to its worker. Enroll requests take
    /// the priority lane.
    pub async fn deliver(&self, device_id: &DeviceId, event: InboundEvent) -> Result<(), CoreError> {
        let tx = self.sender(device_id, event.is_priority())?;
        tx.send(WorkItem::Inbound(event))
            .await
            .map_err(|_| CoreError::Canceled)
    }

    fn sender(
        &self,
        device_id: &DeviceId,
        priority: bool,
    ) -> Result<mpsc::Sender<WorkItem>, CoreError> {
        let handle = self
            .inner
            .devices
            .get(device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                device_id: device_id.clone(),
            })?;
        Ok(if priority {
            handle.priority_tx.clone()
        } else {
            handle.work_tx.clone()
        })
    }

    // ── State observation ────────────────────────────────────────────

    pub fn capability_state(&self, device_id: &DeviceId, capability: &str) -> Option<CapabilityState> {
        self.inner.store.capability_state(device_id, capability)
    }

    pub fn capabilities(&self) -> SnapshotStream<CapabilityRecord> {
        self.inner.store.subscribe_capabilities()
    }

    pub fn device_status(&self, device_id: &DeviceId) -> Option<Arc<DeviceStatus>> {
        self.inner.store.device_status(device_id)
    }

    pub fn devices(&self) -> SnapshotStream<DeviceStatus> {
        self.inner.store.subscribe_devices()
    }

    /// Subscribe to access attempts, resolutions and enrollment transitions.
    pub fn diagnostics(&self) -> broadcast::Receiver<Arc<SequencedRecord>> {
        self.inner.diagnostics.subscribe()
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.inner.devices.iter().map(|e| e.key().clone()).collect()
    }

    pub fn device_count(&self) -> usize {
        self.inner.devices.len()
    }

    /// Live notification listeners across all devices.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}
