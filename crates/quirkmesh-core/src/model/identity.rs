// ── Device identity types ──
//
// DeviceId names a paired device inside the host. Identifier is the
// (manufacturer, product) pair a device reports about itself, and
// IdentifierPattern is the registry-side matcher for it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── DeviceId ────────────────────────────────────────────────────────

/// Host-assigned identity of a paired device (typically its IEEE address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Identifier ──────────────────────────────────────────────────────

/// Manufacturer and product strings as reported by the Basic cluster.
///
/// Firmware pads these fields unpredictably, so trailing NULs and
/// surrounding whitespace are stripped on construction. Matching is
/// otherwise case-sensitive: vendor prefixes such as `_TZ3000_` and
/// `_TZE200_` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub manufacturer_id: String,
    pub product_id: String,
}

impl Identifier {
    pub fn new(manufacturer_id: impl AsRef<str>, product_id: impl AsRef<str>) -> Self {
        Self {
            manufacturer_id: normalize(manufacturer_id.as_ref()),
            product_id: normalize(product_id.as_ref()),
        }
    }
}

pub(crate) fn normalize(raw: &str) -> String {
    raw.trim_end_matches('\0').trim().to_owned()
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.manufacturer_id, self.product_id)
    }
}

// ── Specificity ─────────────────────────────────────────────────────

/// How tightly a pattern pins an identifier. Declaration order is rank.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Specificity {
    /// Both fields wildcarded.
    Generic,
    /// Product pinned, any manufacturer.
    ProductOnly,
    /// Manufacturer pinned, any product.
    ManufacturerOnly,
    /// Both fields pinned.
    Exact,
}

impl Specificity {
    pub const MAX_SCORE: u8 = 3;

    pub const fn score(self) -> u8 {
        match self {
            Self::Generic => 0,
            Self::ProductOnly => 1,
            Self::ManufacturerOnly => 2,
            Self::Exact => 3,
        }
    }
}

// ── IdentifierPattern ───────────────────────────────────────────────

/// Matcher over [`Identifier`]; `None` is a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IdentifierPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl IdentifierPattern {
    pub fn exact(manufacturer_id: impl AsRef<str>, product_id: impl AsRef<str>) -> Self {
        Self {
            manufacturer_id: Some(normalize(manufacturer_id.as_ref())),
            product_id: Some(normalize(product_id.as_ref())),
        }
    }

    pub fn manufacturer(manufacturer_id: impl AsRef<str>) -> Self {
        Self {
            manufacturer_id: Some(normalize(manufacturer_id.as_ref())),
            product_id: None,
        }
    }

    pub fn product(product_id: impl AsRef<str>) -> Self {
        Self {
            manufacturer_id: None,
            product_id: Some(normalize(product_id.as_ref())),
        }
    }

    pub fn generic() -> Self {
        Self::default()
    }

    pub fn matches(&self, identifier: &Identifier) -> bool {
        let field = |pinned: &Option<String>, actual: &str| {
            pinned.as_deref().is_none_or(|p| p == actual)
        };
        field(&self.manufacturer_id, &identifier.manufacturer_id)
            && field(&self.product_id, &identifier.product_id)
    }

    pub fn specificity(&self) -> Specificity {
        match (&self.manufacturer_id, &self.product_id) {
            (Some(_), Some(_)) => Specificity::Exact,
            (Some(_), None) => Specificity::ManufacturerOnly,
            (None, Some(_)) => Specificity::ProductOnly,
            (None, None) => Specificity::Generic,
        }
    }
}

impl fmt::Display for IdentifierPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.manufacturer_id.as_deref().unwrap_or("*"),
            self.product_id.as_deref().unwrap_or("*")
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn identifier_strips_padding() {
        let id = Identifier::new("_TZ3000_abcd\0\0", " TS0001 ");
        assert_eq!(id.manufacturer_id, "_TZ3000_abcd");
        assert_eq!(id.product_id, "TS0001");
        assert_eq!(id.to_string(), "_TZ3000_abcd/TS0001");
    }

    #[test]
    fn wildcards_match_anything() {
        let id = Identifier::new("_TZE200_x", "TS0601");
        assert!(IdentifierPattern::generic().matches(&id));
        assert!(IdentifierPattern::product("TS0601").matches(&id));
        assert!(IdentifierPattern::manufacturer("_TZE200_x").matches(&id));
        assert!(IdentifierPattern::exact("_TZE200_x", "TS0601").matches(&id));
        assert!(!IdentifierPattern::exact("_TZE200_X", "TS0601").matches(&id));
        assert!(!IdentifierPattern::product("TS0001").matches(&id));
    }

    #[test]
    fn specificity_ranks() {
        assert!(Specificity::Exact > Specificity::ManufacturerOnly);
        assert!(Specificity::ManufacturerOnly > Specificity::ProductOnly);
        assert!(Specificity::ProductOnly > Specificity::Generic);
        assert_eq!(IdentifierPattern::product("TS0601").specificity(), Specificity::ProductOnly);
        assert_eq!(Specificity::Exact.score(), Specificity::MAX_SCORE);
    }

    #[test]
    fn pattern_display_uses_star_for_wildcards() {
        assert_eq!(IdentifierPattern::product("TS0601").to_string(), "*/TS0601");
    }

    #[test]
    fn device_id_parses() {
        let id: DeviceId = "0x00158d0001".parse().unwrap();
        assert_eq!(id.as_str(), "0x00158d0001");
    }
}
