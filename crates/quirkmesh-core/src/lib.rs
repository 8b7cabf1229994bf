//! Device host core for mesh sensors and actuators with unreliable,
//! vendor-specific firmware.
//!
//! - **[`FingerprintRegistry`] / [`Resolver`]**: Immutable catalog of
//!   device profiles and the specificity-ranked lookup that maps a
//!   reported (manufacturer, product) pair onto one of them. Ties are
//!   surfaced as ambiguity, never guessed.
//!
//! - **[`AdaptiveAccessor`]**: Executes read, write, report
//!   configuration and command operations through an ordered strategy
//!   cascade, with backoff for transient link failures and per-device
//!   memoization of the strategy that worked.
//!
//! - **[`EnrollmentController`]**: Zone enrollment handshake for
//!   security sensors, including the unprompted response for devices
//!   whose requests get lost.
//!
//! - **[`PollingFallback`]**: Periodic jittered reads for capabilities
//!   whose report configuration failed and for zones that are not yet
//!   enrolled, with periodic retries of the configuration or enrollment.
//!
//! - **[`AlarmResetTimers`]**: Clears zone alarms a configurable time
//!   after they were raised, for sensors that never report the end.
//!
//! - **[`DeviceHost`]**: Ties it together: one worker task per device
//!   serializing all of that device's transport traffic, a reactive
//!   [`DataStore`] of capability values, and a [`Diagnostics`] channel
//!   recording every attempt.

pub mod accessor;
pub mod alarm;
pub mod binder;
pub mod config;
pub mod diagnostics;
pub mod enrollment;
pub mod error;
pub mod host;
pub mod listener;
pub mod model;
pub mod polling;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use accessor::{AdaptiveAccessor, BackoffPolicy, Operation, OperationOutput};
pub use alarm::{AlarmExpired, AlarmResetTimers};
pub use binder::{CapabilityBinder, CapabilityBinding, DeviceBindings};
pub use config::{AccessConfig, EnrollmentConfig, HostConfig, PollingConfig};
pub use diagnostics::{
    AccessAttempt, AttemptOutcome, DiagnosticRecord, Diagnostics, EnrollmentTransition,
    ResolutionSnapshot, SequencedRecord,
};
pub use enrollment::{
    EnrollmentController, EnrollmentState, IAS_CIE_ADDRESS_ATTRIBUTE, ZONE_STATUS_ATTRIBUTE,
    ZoneStatus,
};
pub use error::CoreError;
pub use host::{DeviceHost, DeviceSummary, InboundEvent};
pub use listener::{ListenerRegistry, Subscription};
pub use polling::{PollTask, PollTick, PollingFallback};
pub use registry::{FingerprintRegistry, LoadReport, ProfileDescriptor, RegistryBuilder, RegistryStats};
pub use resolver::Resolver;
pub use store::DataStore;
pub use stream::SnapshotStream;

pub use model::{
    AccessKind, BindFailure, CapabilityRecord, CapabilitySpec, CapabilityState, DeviceId,
    DeviceStatus, EnrollmentSpec, HintValue, Identifier, IdentifierPattern, ProfileEntry,
    ProfileId, ResolutionHints, ResolutionResult, Specificity,
};

// Transport-side types callers need alongside the host.
pub use quirkmesh_api::{
    AttributeValue, ClusterCommand, ClusterId, ClusterRequest, OperationKind, OperationSet,
    ReportingConfig, StrategyDescriptor, StrategyKind, Transport,
};
