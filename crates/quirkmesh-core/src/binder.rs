// ── Capability binding ──
//
// Turns a resolved profile into the set of capabilities a device will
// actually serve, given what its transport implements. Each capability
// is checked on its own; a bad one is reported and skipped, never
// allowed to sink the rest of the device.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use quirkmesh_api::{ClusterId, OperationKind, OperationSet};
use tracing::{debug, warn};

use crate::config::EnrollmentConfig;
use crate::diagnostics::Diagnostics;
use crate::enrollment::EnrollmentController;
use crate::model::{BindFailure, CapabilitySpec, DeviceId, ProfileEntry, ProfileId};

/// A capability accepted for a device.
#[derive(Debug, Clone)]
pub struct CapabilityBinding {
    spec: Arc<CapabilitySpec>,
    /// Operations both needed by the capability and implemented by the
    /// transport.
    operations: OperationSet,
}

impl CapabilityBinding {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &Arc<CapabilitySpec> {
        &self.spec
    }

    pub fn can(&self, kind: OperationKind) -> bool {
        self.operations.contains(kind)
    }

    /// Reporting capability whose transport can configure reports.
    pub fn wants_reporting(&self) -> bool {
        self.can(OperationKind::ConfigureReport)
    }
}

/// Everything the binder produced for one device.
#[derive(Debug)]
pub struct DeviceBindings {
    pub profile_id: ProfileId,
    pub capabilities: IndexMap<String, CapabilityBinding>,
    pub enrollments: BTreeMap<ClusterId, EnrollmentController>,
    pub failures: Vec<BindFailure>,
}

#[derive(Debug, Clone)]
pub struct CapabilityBinder {
    enrollment: EnrollmentConfig,
    diagnostics: Diagnostics,
}

impl CapabilityBinder {
    pub fn new(enrollment: EnrollmentConfig, diagnostics: Diagnostics) -> Self {
        Self {
            enrollment,
            diagnostics,
        }
    }

    pub fn bind(
        &self,
        device_id: &DeviceId,
        profile: &ProfileEntry,
        supported: OperationSet,
    ) -> DeviceBindings {
        let mut bindings = DeviceBindings {
            profile_id: profile.id.clone(),
            capabilities: IndexMap::new(),
            enrollments: BTreeMap::new(),
            failures: Vec::new(),
        };

        for spec in &profile.capabilities {
            let binding = match check(profile, spec, supported) {
                Ok(operations) => CapabilityBinding {
                    spec: Arc::new(spec.clone()),
                    operations,
                },
                Err(reason) => {
                    warn!(
                        device = %device_id,
                        capability = %spec.name,
                        %reason,
                        "capability not bound"
                    );
                    bindings.failures.push(BindFailure {
                        capability: spec.name.clone(),
                        reason,
                    });
                    continue;
                }
            };

            if spec.requires_enrollment() && !bindings.enrollments.contains_key(&spec.cluster) {
                if !supported.contains(OperationKind::Command) {
                    warn!(
                        device = %device_id,
                        capability = %spec.name,
                        "transport cannot send commands, enrollment will fail"
                    );
                }
                bindings.enrollments.insert(
                    spec.cluster,
                    EnrollmentController::new(
                        device_id.clone(),
                        spec,
                        &self.enrollment,
                        self.diagnostics.clone(),
                    ),
                );
            }

            bindings.capabilities.insert(spec.name.clone(), binding);
        }

        debug!(
            device = %device_id,
            profile = %profile.id,
            bound = bindings.capabilities.len(),
            failed = bindings.failures.len(),
            "capabilities bound"
        );
        bindings
    }
}

/// Validate one capability against the profile and the transport.
fn check(
    profile: &ProfileEntry,
    spec: &CapabilitySpec,
    supported: OperationSet,
) -> Result<OperationSet, String> {
    if spec.strategy_order.is_empty() {
        return Err("no access strategies declared".into());
    }
    if let Some(bad) = spec.strategy_order.iter().find(|s| !s.is_complete()) {
        return Err(format!("strategy {} is missing required fields", bad.kind));
    }
    if !profile.cluster_map.is_empty() && !profile.cluster_map.contains_key(&spec.cluster) {
        return Err(format!("cluster {} is not declared by the profile", spec.cluster));
    }
    if spec.requires_enrollment() && !spec.cluster.requires_enrollment() {
        return Err(format!("cluster {} has no enrollment handshake", spec.cluster));
    }

    let usable = spec.access.usable_operations();
    let operations = [
        OperationKind::Read,
        OperationKind::Write,
        OperationKind::ConfigureReport,
        OperationKind::Command,
    ]
    .into_iter()
    .filter(|k| usable.contains(*k) && supported.contains(*k))
    .collect::<OperationSet>();

    if operations.is_empty() {
        return Err(format!(
            "transport implements none of {usable:?} needed for {} access",
            spec.access
        ));
    }
    Ok(operations)
}
