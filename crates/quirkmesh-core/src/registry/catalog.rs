// ── Catalog descriptors ──
//
// Serialized shape of a profile catalog (JSON or TOML). Descriptors use
// the loose, historical spellings found in the field; conversion into
// `ProfileEntry` canonicalizes every cluster name and rejects anything
// it cannot place.

use std::collections::{BTreeMap, HashSet};

use quirkmesh_api::{ReportingConfig, StrategyDescriptor};
use serde::{Deserialize, Serialize};

use super::legacy::canonical_cluster;
use crate::error::CoreError;
use crate::model::identity::normalize;
use crate::model::{
    AccessKind, CapabilitySpec, EnrollmentSpec, HintValue, IdentifierPattern, ProfileEntry,
};

/// One explicit fingerprint. `None` or `"*"` is a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FingerprintDescriptor {
    #[serde(default, alias = "manufacturerName")]
    pub manufacturer: Option<String>,
    #[serde(default, alias = "productId", alias = "modelId")]
    pub product: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    /// Cluster in any supported spelling.
    pub cluster: String,
    pub attribute: u16,
    #[serde(default = "default_endpoint")]
    pub endpoint: u8,
    pub access: AccessKind,
    /// Defaults to the standard strategy alone.
    #[serde(default)]
    pub strategies: Vec<StrategyDescriptor>,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub enrollment: Option<EnrollmentSpec>,
}

fn default_endpoint() -> u8 {
    1
}

/// A catalog entry as written by hand or exported from a driver manifest.
///
/// Fingerprints come from two places: the explicit `fingerprints` list,
/// and the cross product of `manufacturer_names` x `product_ids` (the
/// layout driver manifests use). When only one of the two lists is
/// given, the other side is a wildcard.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileDescriptor {
    pub id: String,
    #[serde(default)]
    pub fingerprints: Vec<FingerprintDescriptor>,
    #[serde(default, alias = "manufacturerName")]
    pub manufacturer_names: Vec<String>,
    #[serde(default, alias = "productId")]
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityDescriptor>,
    /// Cluster name -> endpoints carrying it.
    #[serde(default)]
    pub clusters: BTreeMap<String, Vec<u8>>,
    #[serde(default)]
    pub traits: BTreeMap<String, HintValue>,
}

impl ProfileDescriptor {
    fn patterns(&self) -> Vec<IdentifierPattern> {
        let mut patterns: Vec<IdentifierPattern> = self
            .fingerprints
            .iter()
            .map(|fp| IdentifierPattern {
                manufacturer_id: pinned(fp.manufacturer.as_deref()),
                product_id: pinned(fp.product.as_deref()),
            })
            .collect();

        match (self.manufacturer_names.is_empty(), self.product_ids.is_empty()) {
            (false, false) => {
                for m in &self.manufacturer_names {
                    for p in &self.product_ids {
                        patterns.push(IdentifierPattern::exact(m, p));
                    }
                }
            }
            (false, true) => patterns.extend(
                self.manufacturer_names
                    .iter()
                    .map(IdentifierPattern::manufacturer),
            ),
            (true, false) => {
                patterns.extend(self.product_ids.iter().map(IdentifierPattern::product));
            }
            (true, true) => {}
        }

        let mut seen = HashSet::new();
        patterns.retain(|p| seen.insert(p.clone()));
        patterns
    }
}

fn pinned(raw: Option<&str>) -> Option<String> {
    raw.map(normalize).filter(|s| !s.is_empty() && s != "*")
}

impl TryFrom<CapabilityDescriptor> for CapabilitySpec {
    type Error = CoreError;

    fn try_from(desc: CapabilityDescriptor) -> Result<Self, Self::Error> {
        let cluster = canonical_cluster(&desc.cluster).ok_or_else(|| CoreError::Registry {
            message: format!(
                "capability {}: unknown cluster name {:?}",
                desc.name, desc.cluster
            ),
        })?;

        let strategy_order = if desc.strategies.is_empty() {
            vec![StrategyDescriptor::standard()]
        } else {
            desc.strategies
        };

        Ok(Self {
            name: desc.name,
            cluster,
            attribute_id: desc.attribute,
            endpoint: desc.endpoint,
            access: desc.access,
            strategy_order,
            reporting: desc.reporting,
            enrollment: desc.enrollment,
        })
    }
}

impl TryFrom<ProfileDescriptor> for ProfileEntry {
    type Error = CoreError;

    fn try_from(desc: ProfileDescriptor) -> Result<Self, Self::Error> {
        let patterns = desc.patterns();

        let mut cluster_map = BTreeMap::new();
        for (name, endpoints) in desc.clusters {
            let cluster = canonical_cluster(&name).ok_or_else(|| CoreError::Registry {
                message: format!("profile {}: unknown cluster name {name:?}", desc.id),
            })?;
            cluster_map.insert(cluster, endpoints);
        }

        let capabilities = desc
            .capabilities
            .into_iter()
            .map(CapabilitySpec::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CoreError::Registry {
                message: format!("profile {}: {e}", desc.id),
            })?;

        let mut entry = ProfileEntry::new(desc.id);
        entry.identifier_patterns = patterns;
        entry.capabilities = capabilities;
        entry.cluster_map = cluster_map;
        entry.traits = desc.traits;
        entry.refresh_specificity();
        Ok(entry)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Specificity;
    use quirkmesh_api::{ClusterId, StrategyKind};

    #[test]
    fn manifest_lists_expand_to_cross_product() {
        let desc = ProfileDescriptor {
            id: "switch_2gang".into(),
            manufacturer_names: vec!["_TZ3000_a".into(), "_TZ3000_b".into()],
            product_ids: vec!["TS0002".into(), "TS0012".into()],
            ..ProfileDescriptor::default()
        };
        let entry = ProfileEntry::try_from(desc).unwrap();
        assert_eq!(entry.identifier_patterns.len(), 4);
        assert_eq!(entry.specificity_score, Specificity::Exact);
    }

    #[test]
    fn star_is_a_wildcard() {
        let desc = ProfileDescriptor {
            id: "generic_ts0601".into(),
            fingerprints: vec![FingerprintDescriptor {
                manufacturer: Some("*".into()),
                product: Some("TS0601".into()),
            }],
            ..ProfileDescriptor::default()
        };
        let entry = ProfileEntry::try_from(desc).unwrap();
        assert_eq!(entry.identifier_patterns, vec![IdentifierPattern::product("TS0601")]);
    }

    #[test]
    fn legacy_cluster_names_are_canonicalized() {
        let json = r#"{
            "id": "contact_sensor",
            "manufacturerName": ["_TZ3000_26fmupbb"],
            "productId": ["TS0203"],
            "clusters": { "genBasic": [1], "ssIasZone": [1], "1": [1] },
            "capabilities": [
                { "name": "alarm_contact", "cluster": "iasZone", "attribute": 2,
                  "access": "report", "enrollment": { "auto_reset_ms": 30000 } },
                { "name": "measure_battery", "cluster": "genPowerCfg", "attribute": 33,
                  "access": "report",
                  "strategies": [{ "kind": "standard" }, { "kind": "vendor_tunnel", "datapoint": 4 }] }
            ]
        }"#;
        let desc: ProfileDescriptor = serde_json::from_str(json).unwrap();
        let entry = ProfileEntry::try_from(desc).unwrap();

        assert!(entry.cluster_map.contains_key(&ClusterId::IasZone));
        assert!(entry.cluster_map.contains_key(&ClusterId::PowerConfiguration));
        let alarm = entry.capability("alarm_contact").unwrap();
        assert_eq!(alarm.cluster, ClusterId::IasZone);
        assert!(alarm.requires_enrollment());
        assert_eq!(alarm.enrollment.unwrap().auto_reset_ms, Some(30_000));
        assert_eq!(alarm.strategy_order.len(), 1);
        let battery = entry.capability("measure_battery").unwrap();
        assert_eq!(battery.strategy_order[1].kind, StrategyKind::VendorTunnel);
    }

    #[test]
    fn unknown_cluster_fails_the_descriptor() {
        let desc = ProfileDescriptor {
            id: "bogus".into(),
            product_ids: vec!["TS0001".into()],
            capabilities: vec![CapabilityDescriptor {
                name: "x".into(),
                cluster: "genFrobnicator".into(),
                attribute: 0,
                endpoint: 1,
                access: AccessKind::Read,
                strategies: Vec::new(),
                reporting: ReportingConfig::default(),
                enrollment: None,
            }],
            ..ProfileDescriptor::default()
        };
        let err = ProfileEntry::try_from(desc).unwrap_err();
        assert!(err.to_string().contains("genFrobnicator"));
    }
}
