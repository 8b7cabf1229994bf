// ── Zone enrollment ──
//
// Security sensors only deliver alarms to a host that answered their
// enroll request. Requests are frequently lost on sleepy end devices,
// so the host also sends the response unprompted after binding. The
// handshake completes when the first zone status notification arrives.
// When the host knows its own IEEE address it first writes it to the
// zone's CIE address attribute and reads it back, since some zones only
// send notifications to the address stored there.
//
// Notifications are processed whatever the state: an alarm that
// arrives before the handshake completes is still an alarm.

use std::fmt;

use chrono::Utc;
use quirkmesh_api::{AttributeValue, ClusterCommand, ClusterId, StrategyDescriptor};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::accessor::{AdaptiveAccessor, Operation, OperationOutput};
use crate::config::EnrollmentConfig;
use crate::diagnostics::{DiagnosticRecord, Diagnostics, EnrollmentTransition};
use crate::error::CoreError;
use crate::listener::{ListenerRegistry, Subscription};
use crate::model::{AccessKind, CapabilitySpec, DeviceId};

/// Zone status attribute of the IAS zone cluster.
pub const ZONE_STATUS_ATTRIBUTE: u16 = 0x0002;

/// IAS CIE address attribute: where the zone sends its notifications.
pub const IAS_CIE_ADDRESS_ATTRIBUTE: u16 = 0x0010;

/// Enroll response code for success.
const ENROLL_SUCCESS: u8 = 0x00;

// ── State ───────────────────────────────────────────────────────────

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnrollmentState {
    Unenrolled,
    RequestReceived,
    ResponseSent,
    ProactiveSent,
    Enrolled,
    Failed,
}

impl EnrollmentState {
    /// Waiting for the first status notification.
    pub fn awaiting_status(self) -> bool {
        matches!(self, Self::ResponseSent | Self::ProactiveSent)
    }

    pub fn is_enrolled(self) -> bool {
        matches!(self, Self::Enrolled)
    }
}

// ── Zone status ─────────────────────────────────────────────────────

/// Decoded zone status bitmap.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneStatus(u16);

impl ZoneStatus {
    const ALARM1: u16 = 1 << 0;
    const ALARM2: u16 = 1 << 1;
    const TAMPER: u16 = 1 << 2;
    const BATTERY_LOW: u16 = 1 << 3;
    const TROUBLE: u16 = 1 << 6;

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn from_value(value: &AttributeValue) -> Option<Self> {
        value.as_bitmap16().map(Self)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Either alarm bit set.
    pub const fn is_alarm(self) -> bool {
        self.0 & (Self::ALARM1 | Self::ALARM2) != 0
    }

    pub const fn tamper(self) -> bool {
        self.0 & Self::TAMPER != 0
    }

    pub const fn battery_low(self) -> bool {
        self.0 & Self::BATTERY_LOW != 0
    }

    pub const fn trouble(self) -> bool {
        self.0 & Self::TROUBLE != 0
    }
}

impl fmt::Debug for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoneStatus")
            .field("bits", &format_args!("{:#06x}", self.0))
            .field("alarm", &self.is_alarm())
            .field("tamper", &self.tamper())
            .field("battery_low", &self.battery_low())
            .finish()
    }
}

// ── Controller ──────────────────────────────────────────────────────

/// Handshake state for one (device, security cluster) pair.
pub struct EnrollmentController {
    device_id: DeviceId,
    cluster: ClusterId,
    /// Addressing used to send the enroll response.
    response: CapabilitySpec,
    /// Addressing of the CIE address attribute.
    cie: CapabilitySpec,
    cie_address: Option<u64>,
    cie_confirmed: bool,
    zone_id: u8,
    state: EnrollmentState,
    subscription: Option<Subscription>,
    last_error: Option<CoreError>,
    diagnostics: Diagnostics,
}

impl EnrollmentController {
    pub fn new(
        device_id: DeviceId,
        capability: &CapabilitySpec,
        config: &EnrollmentConfig,
        diagnostics: Diagnostics,
    ) -> Self {
        let zone_id = capability
            .enrollment
            .and_then(|e| e.zone_id)
            .unwrap_or(config.zone_id);
        let strategies = if capability.strategy_order.is_empty() {
            vec![StrategyDescriptor::standard()]
        } else {
            capability.strategy_order.clone()
        };
        let response = CapabilitySpec::new(
            format!("{}:enroll_response", capability.name),
            capability.cluster,
            0,
            AccessKind::Write,
        )
        .on_endpoint(capability.endpoint)
        .with_strategies(strategies.clone());
        let cie = CapabilitySpec::new(
            format!("{}:cie_address", capability.name),
            capability.cluster,
            IAS_CIE_ADDRESS_ATTRIBUTE,
            AccessKind::Write,
        )
        .on_endpoint(capability.endpoint)
        .with_strategies(strategies);

        Self {
            device_id,
            cluster: capability.cluster,
            response,
            cie,
            cie_address: config.cie_address,
            cie_confirmed: false,
            zone_id,
            state: EnrollmentState::Unenrolled,
            subscription: None,
            last_error: None,
            diagnostics,
        }
    }

    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    pub fn state(&self) -> EnrollmentState {
        self.state
    }

    pub fn zone_id(&self) -> u8 {
        self.zone_id
    }

    /// The zone holds our CIE address (read back after writing, or
    /// already present).
    pub fn cie_confirmed(&self) -> bool {
        self.cie_confirmed
    }

    pub fn last_error(&self) -> Option<&CoreError> {
        self.last_error.as_ref()
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_some()
    }

    /// Register the notification listener. Returns `false` when one is
    /// already held; a controller never registers twice.
    pub fn register_listener(&mut self, listeners: &ListenerRegistry) -> bool {
        if self.subscription.is_some() {
            return false;
        }
        self.subscription = Some(listeners.subscribe(self.device_id.clone(), self.cluster));
        true
    }

    /// Drop the listener.
    pub fn release(&mut self) {
        self.subscription = None;
    }

    /// Handle an enroll request from the device.
    pub async fn on_enroll_request(
        &mut self,
        accessor: &mut AdaptiveAccessor,
        cancel: &CancellationToken,
    ) -> EnrollmentState {
        debug!(device = %self.device_id, cluster = %self.cluster, state = %self.state, "enroll request");
        match self.state {
            EnrollmentState::Unenrolled | EnrollmentState::Failed => {
                self.transition(EnrollmentState::RequestReceived);
                self.respond(accessor, cancel, EnrollmentState::ResponseSent)
                    .await;
            }
            EnrollmentState::RequestReceived => {
                self.respond(accessor, cancel, EnrollmentState::ResponseSent)
                    .await;
            }
            // Device asked again: it missed our answer. Re-send, keep state.
            EnrollmentState::ResponseSent
            | EnrollmentState::ProactiveSent
            | EnrollmentState::Enrolled => {
                let current = self.state;
                self.respond(accessor, cancel, current).await;
            }
        }
        self.state
    }

    /// Send the response without waiting for a request.
    pub async fn send_proactive(
        &mut self,
        accessor: &mut AdaptiveAccessor,
        cancel: &CancellationToken,
    ) -> EnrollmentState {
        match self.state {
            EnrollmentState::Unenrolled
            | EnrollmentState::Failed
            | EnrollmentState::ProactiveSent => {
                self.respond(accessor, cancel, EnrollmentState::ProactiveSent)
                    .await;
            }
            EnrollmentState::RequestReceived
            | EnrollmentState::ResponseSent
            | EnrollmentState::Enrolled => {
                debug!(device = %self.device_id, state = %self.state, "proactive response not needed");
            }
        }
        self.state
    }

    /// Decode a zone status notification. Completes the handshake if
    /// one was pending. Returns `None` for a value that is not a bitmap.
    pub fn on_status(&mut self, value: &AttributeValue) -> Option<ZoneStatus> {
        let Some(status) = ZoneStatus::from_value(value) else {
            warn!(device = %self.device_id, %value, "zone status is not a 16-bit bitmap");
            return None;
        };
        if self.state.awaiting_status() {
            self.transition(EnrollmentState::Enrolled);
            info!(device = %self.device_id, zone_id = self.zone_id, "zone enrolled");
        }
        Some(status)
    }

    async fn respond(
        &mut self,
        accessor: &mut AdaptiveAccessor,
        cancel: &CancellationToken,
        on_success: EnrollmentState,
    ) {
        if let Some(address) = self.cie_address.filter(|_| !self.cie_confirmed) {
            match self.store_cie_address(address, accessor, cancel).await {
                Ok(()) => self.cie_confirmed = true,
                Err(CoreError::Canceled) => return,
                // The response still goes out; many zones enroll without it.
                Err(e) => warn!(device = %self.device_id, error = %e, "CIE address not confirmed"),
            }
        }

        let operation = Operation::Command(ClusterCommand::ZoneEnrollResponse {
            response_code: ENROLL_SUCCESS,
            zone_id: self.zone_id,
        });
        match accessor.execute(&self.response, &operation, cancel).await {
            Ok(_) => {
                self.last_error = None;
                self.transition(on_success);
            }
            Err(CoreError::Canceled) => {}
            Err(e) => {
                let err = CoreError::EnrollmentFailure {
                    device_id: self.device_id.clone(),
                    cluster: self.cluster,
                    reason: e.to_string(),
                };
                warn!(error = %err, "enroll response not delivered");
                self.last_error = Some(err);
                self.transition(EnrollmentState::Failed);
            }
        }
    }

    /// Read the CIE address; write and verify it unless it already matches.
    async fn store_cie_address(
        &self,
        address: u64,
        accessor: &mut AdaptiveAccessor,
        cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        match accessor.execute(&self.cie, &Operation::Read, cancel).await {
            Ok(OperationOutput::Value(current)) if cie_matches(&current, address) => {
                debug!(device = %self.device_id, "CIE address already set");
                return Ok(());
            }
            Err(CoreError::Canceled) => return Err(CoreError::Canceled),
            _ => {}
        }

        accessor
            .execute(&self.cie, &Operation::Write(AttributeValue::Uint(address)), cancel)
            .await?;

        let reason = match accessor.execute(&self.cie, &Operation::Read, cancel).await? {
            OperationOutput::Value(stored) if cie_matches(&stored, address) => {
                info!(
                    device = %self.device_id,
                    address = %format_args!("{address:#018x}"),
                    "CIE address written"
                );
                return Ok(());
            }
            OperationOutput::Value(stored) => format!("CIE address reads back as {stored}"),
            OperationOutput::Ack => "CIE address read returned no value".to_owned(),
        };
        Err(CoreError::EnrollmentFailure {
            device_id: self.device_id.clone(),
            cluster: self.cluster,
            reason,
        })
    }

    fn transition(&mut self, to: EnrollmentState) {
        if self.state == to {
            return;
        }
        let from = std::mem::replace(&mut self.state, to);
        debug!(device = %self.device_id, cluster = %self.cluster, %from, %to, "enrollment transition");
        self.diagnostics
            .emit(DiagnosticRecord::Enrollment(EnrollmentTransition {
                device_id: self.device_id.clone(),
                cluster: self.cluster,
                from,
                to,
                timestamp: Utc::now(),
            }));
    }
}

impl fmt::Debug for EnrollmentController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrollmentController")
            .field("device_id", &self.device_id)
            .field("cluster", &self.cluster)
            .field("zone_id", &self.zone_id)
            .field("state", &self.state)
            .field("cie_confirmed", &self.cie_confirmed)
            .field("listening", &self.subscription.is_some())
            .finish_non_exhaustive()
    }
}

/// IEEE addresses arrive either as an integer or as 8 little-endian bytes.
fn cie_matches(value: &AttributeValue, address: u64) -> bool {
    match value {
        AttributeValue::Uint(stored) => *stored == address,
        AttributeValue::Bytes(bytes) => <[u8; 8]>::try_from(bytes.as_slice())
            .is_ok_and(|raw| u64::from_le_bytes(raw) == address),
        _ => false,
    }
}
