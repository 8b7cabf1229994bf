// ── Core error types ──
//
// Caller-facing errors from quirkmesh-core. Transport errors never leak
// raw: the accessor absorbs strategy mismatches and transient failures,
// and only the terminal outcome of a cascade is surfaced here.

use quirkmesh_api::{ClusterId, OperationKind};
use thiserror::Error;

use crate::model::{DeviceId, ProfileId};

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoreError {
    // ── Resolution errors ────────────────────────────────────────────
    #[error("Ambiguous resolution for {identifier}: {} candidate profiles", candidates.len())]
    AmbiguousResolution {
        identifier: String,
        candidates: Vec<ProfileId>,
    },

    #[error("No profile matches {identifier}")]
    NoMatchingProfile { identifier: String },

    // ── Access errors ────────────────────────────────────────────────
    #[error("{operation} on {capability} is not supported by {device_id}: {reason}")]
    UnsupportedOperation {
        device_id: DeviceId,
        capability: String,
        operation: OperationKind,
        reason: String,
    },

    #[error("Network to {device_id} kept failing for {capability}: {message}")]
    TransientNetwork {
        device_id: DeviceId,
        capability: String,
        message: String,
    },

    #[error("{device_id} rejected {capability}: {reason}")]
    PermanentDevice {
        device_id: DeviceId,
        capability: String,
        reason: String,
    },

    #[error("Enrollment on {cluster} failed for {device_id}: {reason}")]
    EnrollmentFailure {
        device_id: DeviceId,
        cluster: ClusterId,
        reason: String,
    },

    #[error("Operation canceled")]
    Canceled,

    // ── Host errors ──────────────────────────────────────────────────
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: DeviceId },

    #[error("Device already registered: {device_id}")]
    DeviceExists { device_id: DeviceId },

    #[error("Capability {capability} is not bound on {device_id}")]
    CapabilityNotFound {
        device_id: DeviceId,
        capability: String,
    },

    #[error("Profile not found: {profile_id}")]
    ProfileNotFound { profile_id: ProfileId },

    // ── Registry errors ──────────────────────────────────────────────
    #[error("Registry error: {message}")]
    Registry { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Terminal access failures after which a reporting capability
    /// falls back to periodic reads.
    pub fn is_access_exhausted(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedOperation { .. }
                | Self::PermanentDevice { .. }
                | Self::TransientNetwork { .. }
        )
    }

    /// Candidate profiles carried by an ambiguous resolution.
    pub fn candidates(&self) -> &[ProfileId] {
        match self {
            Self::AmbiguousResolution { candidates, .. } => candidates,
            _ => &[],
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl CoreError {
    /// Map the last transport error of an exhausted cascade onto the
    /// caller-facing taxonomy.
    ///
    /// `all_transient` is true when every attempt of the cascade failed
    /// with a retryable network error, i.e. the device never answered
    /// with anything definitive.
    pub fn from_transport(
        device_id: &DeviceId,
        capability: &str,
        operation: OperationKind,
        err: &quirkmesh_api::Error,
        all_transient: bool,
    ) -> Self {
        if all_transient {
            return Self::TransientNetwork {
                device_id: device_id.clone(),
                capability: capability.to_owned(),
                message: err.to_string(),
            };
        }
        match err {
            quirkmesh_api::Error::Unsupported { detail, .. } => Self::UnsupportedOperation {
                device_id: device_id.clone(),
                capability: capability.to_owned(),
                operation,
                reason: detail.clone(),
            },
            other => Self::PermanentDevice {
                device_id: device_id.clone(),
                capability: capability.to_owned(),
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn device() -> DeviceId {
        DeviceId::from("0x00124b0001")
    }

    #[test]
    fn unsupported_maps_to_unsupported_operation() {
        let err = quirkmesh_api::Error::Unsupported {
            cluster: ClusterId::IasZone,
            detail: "unsupported attribute".into(),
        };
        let core = CoreError::from_transport(&device(), "alarm_contact", OperationKind::Read, &err, false);
        assert!(matches!(
            core,
            CoreError::UnsupportedOperation {
                operation: OperationKind::Read,
                ..
            }
        ));
        assert!(core.is_access_exhausted());
    }

    #[test]
    fn timeout_maps_to_permanent_device() {
        let err = quirkmesh_api::Error::Timeout { timeout_ms: 5000 };
        let core = CoreError::from_transport(&device(), "onoff", OperationKind::Write, &err, false);
        assert!(matches!(core, CoreError::PermanentDevice { .. }));
    }

    #[test]
    fn all_transient_maps_to_transient_network() {
        let err = quirkmesh_api::Error::Disconnected;
        let core = CoreError::from_transport(&device(), "onoff", OperationKind::Read, &err, true);
        assert!(matches!(core, CoreError::TransientNetwork { .. }));
    }

    #[test]
    fn ambiguous_exposes_candidates() {
        let err = CoreError::AmbiguousResolution {
            identifier: "_TZ3000_abc/TS0001".into(),
            candidates: vec![ProfileId::from("switch_1gang"), ProfileId::from("switch_2gang")],
        };
        assert_eq!(err.candidates().len(), 2);
        assert!(err.to_string().contains("2 candidate profiles"));
        assert!(CoreError::Canceled.candidates().is_empty());
    }
}
