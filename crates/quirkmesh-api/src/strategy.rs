// ── Access strategies ──
//
// A strategy is one concrete way to carry out a cluster operation.
// Profiles list them in priority order; the transport interprets the
// descriptor when building the frame.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the transport should shape a request.
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
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    /// Plain global command for a single attribute.
    Standard,
    /// Several attributes of the cluster in one frame.
    Batched,
    /// One frame per attribute, for firmware that rejects batched reads.
    PerAttribute,
    /// Standard frame with the manufacturer-specific flag and code set.
    ManufacturerSpecific,
    /// Tunnelled through the vendor datapoint cluster.
    VendorTunnel,
}

/// One entry of a capability's strategy order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    pub kind: StrategyKind,

    /// Endpoint override; the capability's endpoint is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<u8>,

    /// Manufacturer code for [`StrategyKind::ManufacturerSpecific`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer_code: Option<u16>,

    /// Datapoint id for [`StrategyKind::VendorTunnel`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datapoint: Option<u8>,

    /// Per-attempt timeout override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl StrategyDescriptor {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            endpoint: None,
            manufacturer_code: None,
            datapoint: None,
            timeout_ms: None,
        }
    }

    pub fn standard() -> Self {
        Self::new(StrategyKind::Standard)
    }

    pub fn manufacturer_specific(code: u16) -> Self {
        Self {
            manufacturer_code: Some(code),
            ..Self::new(StrategyKind::ManufacturerSpecific)
        }
    }

    pub fn vendor_tunnel(datapoint: u8) -> Self {
        Self {
            datapoint: Some(datapoint),
            ..Self::new(StrategyKind::VendorTunnel)
        }
    }

    pub fn on_endpoint(mut self, endpoint: u8) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Effective per-attempt timeout given the host default.
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout_ms.map_or(default, Duration::from_millis)
    }

    /// Whether the descriptor carries the fields its kind needs.
    pub fn is_complete(&self) -> bool {
        match self.kind {
            StrategyKind::ManufacturerSpecific => self.manufacturer_code.is_some(),
            StrategyKind::VendorTunnel => self.datapoint.is_some(),
            StrategyKind::Standard | StrategyKind::Batched | StrategyKind::PerAttribute => true,
        }
    }
}
