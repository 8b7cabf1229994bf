use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cluster::ClusterId;

/// Top-level error type for the `quirkmesh-api` crate.
///
/// The closed set of failures a transport may report for a single
/// attempt. `quirkmesh-core` decides per kind whether to retry the same
/// strategy, advance to the next one, or give up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    // ── Timing ──────────────────────────────────────────────────────
    /// No response within the attempt-level timeout.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Capability ──────────────────────────────────────────────────
    /// The device answered that the cluster, attribute or command is absent.
    #[error("Unsupported by device: {cluster} ({detail})")]
    Unsupported { cluster: ClusterId, detail: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A response arrived but could not be decoded.
    #[error("Malformed response: {message}")]
    Malformed { message: String },

    // ── Link ────────────────────────────────────────────────────────
    /// The device is not currently reachable (left, sleeping, rejoining).
    #[error("Device disconnected")]
    Disconnected,

    /// MAC/NWK level delivery failure (no ack, route error, busy channel).
    #[error("Transient network error: {0}")]
    TransientNetwork(String),
}

/// Payload-free discriminant of [`Error`], used in diagnostics records.
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
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Unsupported,
    Malformed,
    Disconnected,
    TransientNetwork,
}

impl Error {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::Timeout { .. } => TransportErrorKind::Timeout,
            Self::Unsupported { .. } => TransportErrorKind::Unsupported,
            Self::Malformed { .. } => TransportErrorKind::Malformed,
            Self::Disconnected => TransportErrorKind::Disconnected,
            Self::TransientNetwork(_) => TransportErrorKind::TransientNetwork,
        }
    }

    /// Returns `true` if repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::Disconnected)
    }

    /// Returns `true` if the failure says the approach itself is wrong
    /// for this device, so a different strategy should be tried.
    pub fn is_strategy_mismatch(&self) -> bool {
        matches!(
            self,
            Self::Unsupported { .. } | Self::Timeout { .. } | Self::Malformed { .. }
        )
    }
}
