// ── Fingerprint registry ──
//
// Mutable while being built, frozen afterwards. The frozen registry is
// shared behind an `Arc` and read concurrently without locking.

pub mod catalog;
pub mod legacy;

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{Identifier, IdentifierPattern, ProfileEntry, ProfileId, Specificity};

pub use catalog::{CapabilityDescriptor, FingerprintDescriptor, ProfileDescriptor};
pub use legacy::canonical_cluster;

// ── Builder ─────────────────────────────────────────────────────────

/// Accumulates profiles in registration order.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    profiles: IndexMap<ProfileId, ProfileEntry>,
}

/// Outcome of [`RegistryBuilder::load`].
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    /// Descriptor id and the reason it was skipped.
    pub rejected: Vec<(String, CoreError)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a profile. Rejects duplicate ids, profiles without patterns
    /// and profiles declaring the same capability name twice.
    pub fn register(&mut self, mut profile: ProfileEntry) -> Result<(), CoreError> {
        if self.profiles.contains_key(&profile.id) {
            return Err(CoreError::Registry {
                message: format!("duplicate profile id {}", profile.id),
            });
        }
        if profile.identifier_patterns.is_empty() {
            return Err(CoreError::Registry {
                message: format!("profile {} declares no identifier patterns", profile.id),
            });
        }
        if let Some(dup) = first_duplicate_capability(&profile) {
            return Err(CoreError::Registry {
                message: format!("profile {} declares capability {dup} twice", profile.id),
            });
        }

        profile.refresh_specificity();
        debug!(
            profile = %profile.id,
            patterns = profile.identifier_patterns.len(),
            specificity = %profile.specificity_score,
            "profile registered"
        );
        self.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    /// Convert and register catalog descriptors. A bad descriptor is
    /// skipped and reported; the rest still load.
    pub fn load<I>(&mut self, descriptors: I) -> LoadReport
    where
        I: IntoIterator<Item = ProfileDescriptor>,
    {
        let mut report = LoadReport::default();
        for desc in descriptors {
            let id = desc.id.clone();
            match ProfileEntry::try_from(desc).and_then(|entry| self.register(entry)) {
                Ok(()) => report.loaded += 1,
                Err(e) => {
                    warn!(profile = %id, error = %e, "skipping catalog entry");
                    report.rejected.push((id, e));
                }
            }
        }
        report
    }

    /// Parse a JSON array of descriptors and load it.
    pub fn load_json(&mut self, json: &str) -> Result<LoadReport, CoreError> {
        let descriptors: Vec<ProfileDescriptor> =
            serde_json::from_str(json).map_err(|e| CoreError::Registry {
                message: format!("invalid catalog: {e}"),
            })?;
        Ok(self.load(descriptors))
    }

    pub fn build(self) -> FingerprintRegistry {
        FingerprintRegistry {
            profiles: self.profiles,
        }
    }
}

fn first_duplicate_capability(profile: &ProfileEntry) -> Option<String> {
    let mut names = HashSet::new();
    profile
        .capabilities
        .iter()
        .find(|c| !names.insert(c.name.as_str()))
        .map(|c| c.name.clone())
}

// ── Frozen registry ─────────────────────────────────────────────────

/// Immutable catalog of device profiles.
#[derive(Debug, Default)]
pub struct FingerprintRegistry {
    profiles: IndexMap<ProfileId, ProfileEntry>,
}

/// Counts for diagnostics and catalog audits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub profiles: usize,
    pub patterns: usize,
    pub capabilities: usize,
    /// Pattern count per specificity class.
    pub by_specificity: BTreeMap<Specificity, usize>,
}

impl FingerprintRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn profile(&self, id: &ProfileId) -> Option<&ProfileEntry> {
        self.profiles.get(id)
    }

    /// Profiles in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ProfileEntry> {
        self.profiles.values()
    }

    /// Every profile with a matching pattern, paired with its most
    /// specific matching pattern, in registration order.
    pub fn matches<'a>(
        &'a self,
        identifier: &'a Identifier,
    ) -> impl Iterator<Item = (&'a ProfileEntry, &'a IdentifierPattern)> + 'a {
        self.profiles
            .values()
            .filter_map(move |p| p.best_match(identifier).map(|pat| (p, pat)))
    }

    /// Profiles that pin `product_id` in at least one pattern.
    pub fn profiles_for_product(&self, product_id: &str) -> Vec<&ProfileEntry> {
        self.profiles
            .values()
            .filter(|p| {
                p.identifier_patterns
                    .iter()
                    .any(|pat| pat.product_id.as_deref() == Some(product_id))
            })
            .collect()
    }

    pub fn statistics(&self) -> RegistryStats {
        let mut by_specificity = BTreeMap::new();
        let mut patterns = 0;
        for pat in self.profiles.values().flat_map(|p| &p.identifier_patterns) {
            patterns += 1;
            *by_specificity.entry(pat.specificity()).or_insert(0) += 1;
        }
        RegistryStats {
            profiles: self.profiles.len(),
            patterns,
            capabilities: self.profiles.values().map(|p| p.capabilities.len()).sum(),
            by_specificity,
        }
    }
}
