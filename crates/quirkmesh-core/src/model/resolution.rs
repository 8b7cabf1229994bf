// ── Resolution outcome ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::identity::{Identifier, IdentifierPattern};
use super::profile::{HintValue, ProfileId};
use crate::error::CoreError;

/// Optional tie-breaking information supplied at pairing time.
///
/// Each entry is compared against profile traits of the same key. The
/// reserved key [`ResolutionHints::CAPABILITY`] instead names a
/// capability the chosen profile must declare.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolutionHints {
    entries: BTreeMap<String, HintValue>,
}

impl ResolutionHints {
    pub const CAPABILITY: &'static str = "capability";

    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<HintValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<HintValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&HintValue> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HintValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Result of resolving one identifier against the registry.
///
/// Exactly one of three shapes:
/// - resolved: `profile_id` set, `ambiguous == false`
/// - ambiguous: no `profile_id`, two or more `candidates`
/// - no match: no `profile_id`, `ambiguous == true`, empty `candidates`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub identifier: Identifier,
    pub profile_id: Option<ProfileId>,
    pub matched_pattern: Option<IdentifierPattern>,
    /// Specificity of the winning pattern over the maximum, divided by
    /// the number of profiles still tied. Always in `[0, 1]`.
    pub confidence: f64,
    pub ambiguous: bool,
    /// Tied profiles in registration order (the winner alone when resolved).
    pub candidates: Vec<ProfileId>,
}

impl ResolutionResult {
    pub(crate) fn no_match(identifier: Identifier) -> Self {
        Self {
            identifier,
            profile_id: None,
            matched_pattern: None,
            confidence: 0.0,
            ambiguous: true,
            candidates: Vec::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.profile_id.is_some() && !self.ambiguous
    }

    pub fn is_no_match(&self) -> bool {
        self.profile_id.is_none() && self.candidates.is_empty()
    }

    /// Collapse into the selected profile, or the error a caller should
    /// surface (candidates are kept for human review).
    pub fn into_selection(self) -> Result<ProfileId, CoreError> {
        match self.profile_id {
            Some(id) if !self.ambiguous => Ok(id),
            _ if self.candidates.is_empty() => Err(CoreError::NoMatchingProfile {
                identifier: self.identifier.to_string(),
            }),
            _ => Err(CoreError::AmbiguousResolution {
                identifier: self.identifier.to_string(),
                candidates: self.candidates,
            }),
        }
    }
}
