// ── Device profiles ──
//
// A profile describes one device family: the identifiers it claims,
// the capabilities it exposes, and how each capability is reached on
// the wire. Profiles are immutable once the registry is built.

use std::collections::BTreeMap;
use std::fmt;

use quirkmesh_api::{ClusterId, OperationKind, OperationSet, ReportingConfig, StrategyDescriptor};
use serde::{Deserialize, Serialize};

use super::identity::{Identifier, IdentifierPattern, Specificity};

// ── ProfileId ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProfileId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Traits and hints ────────────────────────────────────────────────

/// Scalar value of a profile trait or a resolution hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HintValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl HintValue {
    /// Equality that tolerates numbers carried as text, since pairing
    /// flows often collect hints as strings.
    pub fn loosely_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(n), Self::Text(s)) | (Self::Text(s), Self::Int(n)) => {
                s.trim().parse::<i64>().is_ok_and(|parsed| parsed == *n)
            }
            _ => self == other,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for HintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for HintValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for HintValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u8> for HintValue {
    fn from(n: u8) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<&str> for HintValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for HintValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

// ── Capabilities ────────────────────────────────────────────────────

/// How the host interacts with a capability.
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccessKind {
    /// Value fetched on demand.
    Read,
    /// Value pushed to the device.
    Write,
    /// Device reports changes; falls back to polling reads.
    Report,
}

impl AccessKind {
    /// Operation kinds through which this access can be served. Binding
    /// needs the transport to implement at least one of them.
    pub fn usable_operations(self) -> OperationSet {
        match self {
            Self::Read => OperationSet::empty().with(OperationKind::Read),
            Self::Write => OperationSet::empty().with(OperationKind::Write),
            Self::Report => OperationSet::empty()
                .with(OperationKind::ConfigureReport)
                .with(OperationKind::Read),
        }
    }
}

/// Zone enrollment parameters of a security capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnrollmentSpec {
    /// Zone id to assign; the host default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<u8>,
    /// Alarm auto-reset delay in milliseconds; 0 disables it for this
    /// capability whatever the host default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_reset_ms: Option<u64>,
}

/// One named, typed device feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub name: String,
    pub cluster: ClusterId,
    pub attribute_id: u16,
    #[serde(default = "default_endpoint")]
    pub endpoint: u8,
    pub access: AccessKind,
    /// Strategies in priority order. Never empty for a bindable capability.
    pub strategy_order: Vec<StrategyDescriptor>,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<EnrollmentSpec>,
}

fn default_endpoint() -> u8 {
    1
}

impl CapabilitySpec {
    /// A capability on endpoint 1 with the standard strategy only.
    pub fn new(
        name: impl Into<String>,
        cluster: ClusterId,
        attribute_id: u16,
        access: AccessKind,
    ) -> Self {
        Self {
            name: name.into(),
            cluster,
            attribute_id,
            endpoint: default_endpoint(),
            access,
            strategy_order: vec![StrategyDescriptor::standard()],
            reporting: ReportingConfig::default(),
            enrollment: None,
        }
    }

    #[must_use]
    pub fn on_endpoint(mut self, endpoint: u8) -> Self {
        self.endpoint = endpoint;
        self
    }

    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<StrategyDescriptor>) -> Self {
        self.strategy_order = strategies;
        self
    }

    #[must_use]
    pub fn with_reporting(mut self, reporting: ReportingConfig) -> Self {
        self.reporting = reporting;
        self
    }

    #[must_use]
    pub fn with_enrollment(mut self, enrollment: EnrollmentSpec) -> Self {
        self.enrollment = Some(enrollment);
        self
    }

    pub fn requires_enrollment(&self) -> bool {
        self.enrollment.is_some()
    }
}

// ── ProfileEntry ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub id: ProfileId,
    pub identifier_patterns: Vec<IdentifierPattern>,
    pub capabilities: Vec<CapabilitySpec>,
    /// Clusters the device family exposes, with the endpoints carrying
    /// them. Empty means "not declared" and disables the cluster check
    /// at bind time.
    #[serde(default)]
    pub cluster_map: BTreeMap<ClusterId, Vec<u8>>,
    /// Free-form traits used to break resolution ties (gang count,
    /// power source, ...).
    #[serde(default)]
    pub traits: BTreeMap<String, HintValue>,
    /// Highest specificity among the patterns; recomputed on registration.
    pub specificity_score: Specificity,
}

impl ProfileEntry {
    pub fn new(id: impl Into<ProfileId>) -> Self {
        Self {
            id: id.into(),
            identifier_patterns: Vec::new(),
            capabilities: Vec::new(),
            cluster_map: BTreeMap::new(),
            traits: BTreeMap::new(),
            specificity_score: Specificity::Generic,
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: IdentifierPattern) -> Self {
        self.identifier_patterns.push(pattern);
        self.refresh_specificity();
        self
    }

    #[must_use]
    pub fn with_capability(mut self, capability: CapabilitySpec) -> Self {
        self.capabilities.push(capability);
        self
    }

    #[must_use]
    pub fn with_cluster(mut self, cluster: ClusterId, endpoints: Vec<u8>) -> Self {
        self.cluster_map.insert(cluster, endpoints);
        self
    }

    #[must_use]
    pub fn with_trait(mut self, key: impl Into<String>, value: impl Into<HintValue>) -> Self {
        self.traits.insert(key.into(), value.into());
        self
    }

    pub(crate) fn refresh_specificity(&mut self) {
        self.specificity_score = self
            .identifier_patterns
            .iter()
            .map(IdentifierPattern::specificity)
            .max()
            .unwrap_or(Specificity::Generic);
    }

    pub fn capability(&self, name: &str) -> Option<&CapabilitySpec> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    /// Most specific of this profile's patterns that matches `identifier`.
    pub fn best_match(&self, identifier: &Identifier) -> Option<&IdentifierPattern> {
        self.identifier_patterns
            .iter()
            .filter(|p| p.matches(identifier))
            .max_by_key(|p| p.specificity())
    }
}
