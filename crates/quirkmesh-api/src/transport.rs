// Transport seam shared by every device driver.
//
// The host never frames packets itself. A `Transport` is handed one
// request at a time (the host serializes calls per device) and answers
// with a value, an ack, or one of the closed error kinds.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterId;
use crate::error::Error;
use crate::strategy::StrategyDescriptor;
use crate::value::AttributeValue;

// ── Operation kinds ─────────────────────────────────────────────────

/// The four request shapes a transport may implement.
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
pub enum OperationKind {
    Read,
    Write,
    ConfigureReport,
    Command,
}

impl OperationKind {
    const fn bit(self) -> u8 {
        match self {
            Self::Read => 0b0001,
            Self::Write => 0b0010,
            Self::ConfigureReport => 0b0100,
            Self::Command => 0b1000,
        }
    }
}

/// Set of operation kinds a transport declares once, at bind time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperationSet(u8);

impl OperationSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(0b1111)
    }

    pub const fn with(self, kind: OperationKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub const fn without(self, kind: OperationKind) -> Self {
        Self(self.0 & !kind.bit())
    }

    pub const fn contains(self, kind: OperationKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<OperationKind> for OperationSet {
    fn from_iter<I: IntoIterator<Item = OperationKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl fmt::Debug for OperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds = [
            OperationKind::Read,
            OperationKind::Write,
            OperationKind::ConfigureReport,
            OperationKind::Command,
        ];
        f.debug_set()
            .entries(kinds.iter().filter(|k| self.contains(**k)))
            .finish()
    }
}

// ── Requests ────────────────────────────────────────────────────────

/// Addressing and shaping for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRequest {
    pub endpoint: u8,
    pub cluster: ClusterId,
    pub attribute: u16,
    pub strategy: StrategyDescriptor,
    /// Attempt-level timeout. Transports should give up on their own
    /// once it elapses; the host enforces it as well.
    pub timeout: Duration,
}

/// Attribute reporting parameters (seconds, as carried on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingConfig {
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u16,
    #[serde(default = "default_max_interval")]
    pub max_interval_secs: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reportable_change: Option<u32>,
}

fn default_min_interval() -> u16 {
    1
}

fn default_max_interval() -> u16 {
    3600
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval(),
            max_interval_secs: default_max_interval(),
            reportable_change: None,
        }
    }
}

/// Cluster-specific commands the host needs to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClusterCommand {
    /// Reply to a zone's enroll request (also sent unprompted).
    ZoneEnrollResponse { response_code: u8, zone_id: u8 },
    /// Any other cluster command, already encoded by the caller.
    Raw { command_id: u8, payload: Vec<u8> },
}

// ── Transport trait ─────────────────────────────────────────────────

/// Request/response access to one device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Operation kinds this transport implements at all.
    ///
    /// Consulted once when capabilities are bound; the accessor never
    /// rechecks support on each call.
    fn supported_operations(&self) -> OperationSet {
        OperationSet::all()
    }

    async fn read_attribute(&self, request: &ClusterRequest) -> Result<AttributeValue, Error>;

    async fn write_attribute(
        &self,
        request: &ClusterRequest,
        value: &AttributeValue,
    ) -> Result<(), Error>;

    async fn configure_reporting(
        &self,
        request: &ClusterRequest,
        config: &ReportingConfig,
    ) -> Result<(), Error>;

    async fn invoke_command(
        &self,
        request: &ClusterRequest,
        command: &ClusterCommand,
    ) -> Result<(), Error>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct ReadOnly;

    #[async_trait]
    impl Transport for ReadOnly {
        fn supported_operations(&self) -> OperationSet {
            OperationSet::empty().with(OperationKind::Read)
        }

        async fn read_attribute(
            &self,
            _request: &ClusterRequest,
        ) -> Result<AttributeValue, Error> {
            Ok(AttributeValue::Bool(true))
        }

        async fn write_attribute(
            &self,
            request: &ClusterRequest,
            _value: &AttributeValue,
        ) -> Result<(), Error> {
            Err(Error::Unsupported {
                cluster: request.cluster,
                detail: "write".into(),
            })
        }

        async fn configure_reporting(
            &self,
            request: &ClusterRequest,
            _config: &ReportingConfig,
        ) -> Result<(), Error> {
            Err(Error::Unsupported {
                cluster: request.cluster,
                detail: "configure reporting".into(),
            })
        }

        async fn invoke_command(
            &self,
            request: &ClusterRequest,
            _command: &ClusterCommand,
        ) -> Result<(), Error> {
            Err(Error::Unsupported {
                cluster: request.cluster,
                detail: "command".into(),
            })
        }
    }

    #[test]
    fn operation_set_membership() {
        let set: OperationSet = [OperationKind::Read, OperationKind::Command]
            .into_iter()
            .collect();
        assert!(set.contains(OperationKind::Read));
        assert!(set.contains(OperationKind::Command));
        assert!(!set.contains(OperationKind::Write));
        assert!(!set.without(OperationKind::Read).contains(OperationKind::Read));
        assert!(OperationSet::empty().is_empty());
        assert_eq!(format!("{set:?}"), "{Read, Command}");
    }

    #[test]
    fn reporting_defaults_fill_missing_fields() {
        let cfg: ReportingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ReportingConfig::default());
        assert_eq!(cfg.max_interval_secs, 3600);
    }

    #[tokio::test]
    async fn trait_objects_expose_declared_operations() {
        let transport: Box<dyn Transport> = Box::new(ReadOnly);
        assert!(!transport.supported_operations().contains(OperationKind::Write));

        let request = ClusterRequest {
            endpoint: 1,
            cluster: ClusterId::OnOff,
            attribute: 0,
            strategy: StrategyDescriptor::standard(),
            timeout: Duration::from_secs(1),
        };
        let value = transport.read_attribute(&request).await.unwrap();
        assert_eq!(value, AttributeValue::Bool(true));
    }
}
