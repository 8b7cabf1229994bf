// ── Capability and device status records ──
//
// What the host publishes through the store: the freshness-tagged value
// of each bound capability, and a per-device status summary.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use quirkmesh_api::{AttributeValue, ClusterId};
use serde::{Deserialize, Serialize};

use super::identity::DeviceId;
use super::profile::ProfileId;
use crate::enrollment::EnrollmentState;

/// Value of a capability as last observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CapabilityState {
    /// Never observed since the device was bound.
    Unknown,
    /// Came from a successful read or an inbound report.
    Fresh {
        value: AttributeValue,
        updated_at: DateTime<Utc>,
    },
    /// The latest attempt to refresh failed; `last` is kept for display.
    Stale {
        last: Option<AttributeValue>,
        since: DateTime<Utc>,
        reason: String,
    },
}

impl CapabilityState {
    pub fn fresh(value: AttributeValue) -> Self {
        Self::Fresh {
            value,
            updated_at: Utc::now(),
        }
    }

    /// Degrade to stale, keeping whatever value was last known.
    #[must_use]
    pub fn into_stale(self, reason: impl Into<String>) -> Self {
        let last = match self {
            Self::Unknown => None,
            Self::Fresh { value, .. } => Some(value),
            Self::Stale { last, .. } => last,
        };
        Self::Stale {
            last,
            since: Utc::now(),
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> Option<&AttributeValue> {
        match self {
            Self::Fresh { value, .. } => Some(value),
            Self::Stale { last, .. } => last.as_ref(),
            Self::Unknown => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }
}

/// Store row for one (device, capability) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub device_id: DeviceId,
    pub capability: String,
    pub state: CapabilityState,
}

/// A capability the binder refused, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindFailure {
    pub capability: String,
    pub reason: String,
}

/// Per-device summary published after every lifecycle change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device_id: DeviceId,
    pub profile_id: ProfileId,
    pub bound: Vec<String>,
    pub bind_failures: Vec<BindFailure>,
    pub enrollment: BTreeMap<ClusterId, EnrollmentState>,
    /// Capabilities currently served by fallback polling.
    pub polling: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_keeps_last_value() {
        let state = CapabilityState::fresh(AttributeValue::Bool(true)).into_stale("timeout");
        assert_eq!(state.value(), Some(&AttributeValue::Bool(true)));
        assert!(!state.is_fresh());

        let never = CapabilityState::Unknown.into_stale("timeout");
        assert_eq!(never.value(), None);
    }
}
