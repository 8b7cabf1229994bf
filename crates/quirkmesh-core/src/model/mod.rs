// ── Domain model ──
//
// Identity, profile and state types shared by the registry, the
// accessor and the host.

pub mod capability;
pub mod identity;
pub mod profile;
pub mod resolution;

// ── Re-exports ──────────────────────────────────────────────────────

pub use capability::{BindFailure, CapabilityRecord, CapabilityState, DeviceStatus};
pub use identity::{DeviceId, Identifier, IdentifierPattern, Specificity};
pub use profile::{AccessKind, CapabilitySpec, EnrollmentSpec, HintValue, ProfileEntry, ProfileId};
pub use resolution::{ResolutionHints, ResolutionResult};
