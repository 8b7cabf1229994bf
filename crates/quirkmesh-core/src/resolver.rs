// ── Profile resolution ──
//
// Picks the single most specific profile for an identifier. Ties at the
// top specificity are narrowed with hints; whatever is still tied comes
// back as an ambiguous result carrying every candidate. Resolution never
// guesses and never mutates the registry.

use std::sync::Arc;

use tracing::debug;

use crate::model::{
    HintValue, Identifier, IdentifierPattern, ProfileEntry, ResolutionHints, ResolutionResult,
    Specificity,
};
use crate::registry::FingerprintRegistry;

#[derive(Debug, Clone)]
pub struct Resolver {
    registry: Arc<FingerprintRegistry>,
}

type Candidate<'a> = (&'a ProfileEntry, &'a IdentifierPattern);

impl Resolver {
    pub fn new(registry: Arc<FingerprintRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<FingerprintRegistry> {
        &self.registry
    }

    pub fn resolve(
        &self,
        identifier: &Identifier,
        hints: Option<&ResolutionHints>,
    ) -> ResolutionResult {
        let matches: Vec<Candidate<'_>> = self.registry.matches(identifier).collect();

        let Some(top) = matches.iter().map(|(_, pat)| pat.specificity()).max() else {
            debug!(%identifier, "no profile matches");
            return ResolutionResult::no_match(identifier.clone());
        };

        let mut tied: Vec<Candidate<'_>> = matches
            .into_iter()
            .filter(|(_, pat)| pat.specificity() == top)
            .collect();

        if let Some(hints) = hints.filter(|_| tied.len() > 1) {
            tied = apply_hints(tied, hints);
        }

        // Equal-specificity patterns matching the same identifier are
        // identical, so the first one speaks for all of them.
        let matched_pattern = tied.first().map(|(_, pat)| (*pat).clone());
        let candidates: Vec<_> = tied.iter().map(|(p, _)| p.id.clone()).collect();
        let confidence = confidence(top, candidates.len());

        if let [(winner, _)] = tied.as_slice() {
            debug!(%identifier, profile = %winner.id, %top, "profile resolved");
            ResolutionResult {
                identifier: identifier.clone(),
                profile_id: Some(winner.id.clone()),
                matched_pattern,
                confidence,
                ambiguous: false,
                candidates,
            }
        } else {
            debug!(
                %identifier,
                candidates = candidates.len(),
                %top,
                "resolution ambiguous"
            );
            ResolutionResult {
                identifier: identifier.clone(),
                profile_id: None,
                matched_pattern,
                confidence,
                ambiguous: true,
                candidates,
            }
        }
    }
}

/// Narrow the tied set one hint at a time. A hint that would eliminate
/// every candidate carries no information and is skipped.
fn apply_hints<'a>(mut tied: Vec<Candidate<'a>>, hints: &ResolutionHints) -> Vec<Candidate<'a>> {
    for (key, value) in hints.iter() {
        if tied.len() <= 1 {
            break;
        }
        let narrowed: Vec<_> = tied
            .iter()
            .copied()
            .filter(|(profile, _)| hint_matches(profile, key, value))
            .collect();
        if narrowed.is_empty() {
            debug!(hint = key, %value, "hint matches no candidate, ignored");
        } else {
            tied = narrowed;
        }
    }
    tied
}

fn hint_matches(profile: &ProfileEntry, key: &str, value: &HintValue) -> bool {
    if key == ResolutionHints::CAPABILITY {
        return value
            .as_text()
            .is_some_and(|name| profile.capability(name).is_some());
    }
    profile
        .traits
        .get(key)
        .is_some_and(|declared| declared.loosely_eq(value))
}

fn confidence(top: Specificity, tied: usize) -> f64 {
    let share = f64::from(top.score()) / f64::from(Specificity::MAX_SCORE);
    let tied = u32::try_from(tied.max(1)).map_or(f64::from(u32::MAX), f64::from);
    share / tied
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{AccessKind, CapabilitySpec, ProfileId};
    use crate::registry::RegistryBuilder;
    use pretty_assertions::assert_eq;
    use quirkmesh_api::ClusterId;

    fn resolver(profiles: Vec<ProfileEntry>) -> Resolver {
        let mut builder = RegistryBuilder::new();
        for p in profiles {
            builder.register(p).unwrap();
        }
        Resolver::new(Arc::new(builder.build()))
    }

    #[test]
    fn exact_beats_product_only() {
        let r = resolver(vec![
            ProfileEntry::new("generic").with_pattern(IdentifierPattern::product("TS0601")),
            ProfileEntry::new("thermostat")
                .with_pattern(IdentifierPattern::exact("_TZE200_ckud7u2l", "TS0601")),
        ]);
        let result = r.resolve(&Identifier::new("_TZE200_ckud7u2l", "TS0601"), None);
        assert_eq!(result.profile_id, Some("thermostat".into()));
        assert!(!result.ambiguous);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(result.candidates, vec![ProfileId::from("thermostat")]);
    }

    #[test]
    fn manufacturer_only_beats_product_only() {
        let r = resolver(vec![
            ProfileEntry::new("by_product").with_pattern(IdentifierPattern::product("TS0601")),
            ProfileEntry::new("by_vendor").with_pattern(IdentifierPattern::manufacturer("_TZE200_x")),
        ]);
        let result = r.resolve(&Identifier::new("_TZE200_x", "TS0601"), None);
        assert_eq!(result.profile_id, Some("by_vendor".into()));
        assert_eq!(result.matched_pattern, Some(IdentifierPattern::manufacturer("_TZE200_x")));
    }

    #[test]
    fn tie_without_hints_is_ambiguous() {
        let r = resolver(vec![
            ProfileEntry::new("a").with_pattern(IdentifierPattern::product("TS0001")),
            ProfileEntry::new("b").with_pattern(IdentifierPattern::product("TS0001")),
        ]);
        let result = r.resolve(&Identifier::new("_TZ3000_q", "TS0001"), None);
        assert!(result.ambiguous);
        assert_eq!(result.profile_id, None);
        assert_eq!(result.candidates, vec![ProfileId::from("a"), ProfileId::from("b")]);
        assert!((result.confidence - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn no_match_is_reported() {
        let r = resolver(vec![
            ProfileEntry::new("a").with_pattern(IdentifierPattern::product("TS0001")),
        ]);
        let result = r.resolve(&Identifier::new("_TZ3000_q", "TS0002"), None);
        assert!(result.is_no_match());
        assert!(result.ambiguous);
        assert!(result.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn trait_hint_breaks_tie() {
        let r = resolver(vec![
            ProfileEntry::new("one")
                .with_pattern(IdentifierPattern::product("TS0003"))
                .with_trait("gang_count", 1_i64),
            ProfileEntry::new("three")
                .with_pattern(IdentifierPattern::product("TS0003"))
                .with_trait("gang_count", 3_i64),
        ]);
        let hints = ResolutionHints::new().with("gang_count", "3");
        let result = r.resolve(&Identifier::new("_TZ3000_q", "TS0003"), Some(&hints));
        assert_eq!(result.profile_id, Some("three".into()));
    }

    #[test]
    fn capability_hint_breaks_tie() {
        let r = resolver(vec![
            ProfileEntry::new("plain").with_pattern(IdentifierPattern::product("TS011F")),
            ProfileEntry::new("metering")
                .with_pattern(IdentifierPattern::product("TS011F"))
                .with_capability(CapabilitySpec::new(
                    "measure_power",
                    ClusterId::ElectricalMeasurement,
                    0x050B,
                    AccessKind::Report,
                )),
        ]);
        let hints = ResolutionHints::new().with(ResolutionHints::CAPABILITY, "measure_power");
        let result = r.resolve(&Identifier::new("_TZ3000_q", "TS011F"), Some(&hints));
        assert_eq!(result.profile_id, Some("metering".into()));
    }

    #[test]
    fn hint_that_matches_nothing_is_ignored() {
        let r = resolver(vec![
            ProfileEntry::new("a")
                .with_pattern(IdentifierPattern::product("TS0001"))
                .with_trait("power", "mains"),
            ProfileEntry::new("b")
                .with_pattern(IdentifierPattern::product("TS0001"))
                .with_trait("power", "battery"),
        ]);
        let hints = ResolutionHints::new()
            .with("gang_count", 4_i64)
            .with("power", "battery");
        let result = r.resolve(&Identifier::new("_TZ3000_q", "TS0001"), Some(&hints));
        assert_eq!(result.profile_id, Some("b".into()));
    }

    #[test]
    fn hints_never_promote_lower_specificity() {
        let r = resolver(vec![
            ProfileEntry::new("exact")
                .with_pattern(IdentifierPattern::exact("_TZ3000_q", "TS0001")),
            ProfileEntry::new("hinted")
                .with_pattern(IdentifierPattern::product("TS0001"))
                .with_trait("gang_count", 1_i64),
        ]);
        let hints = ResolutionHints::new().with("gang_count", 1_i64);
        let result = r.resolve(&Identifier::new("_TZ3000_q", "TS0001"), Some(&hints));
        assert_eq!(result.profile_id, Some("exact".into()));
    }
}
