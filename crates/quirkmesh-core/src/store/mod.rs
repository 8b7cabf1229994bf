// ── Reactive state store ──
//
// Capability values and device status, shared by every device worker
// and read concurrently by consumers.

mod collection;

use std::sync::Arc;

use quirkmesh_api::AttributeValue;

use crate::model::{CapabilityRecord, CapabilityState, DeviceId, DeviceStatus};
use crate::stream::SnapshotStream;
use collection::Collection;

/// Central store for capability values and device status.
pub struct DataStore {
    capabilities: Collection<CapabilityKey, CapabilityRecord>,
    devices: Collection<DeviceId, DeviceStatus>,
}

type CapabilityKey = (DeviceId, String);

fn capability_key(device_id: &DeviceId, capability: &str) -> CapabilityKey {
    (device_id.clone(), capability.to_owned())
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            capabilities: Collection::new(),
            devices: Collection::new(),
        }
    }

    // ── Capability state ─────────────────────────────────────────────

    pub fn capability_state(&self, device_id: &DeviceId, capability: &str) -> Option<CapabilityState> {
        self.capabilities
            .get(&capability_key(device_id, capability))
            .map(|r| r.state.clone())
    }

    pub(crate) fn init_capability(&self, device_id: &DeviceId, capability: &str) {
        self.capabilities.upsert(
            capability_key(device_id, capability),
            CapabilityRecord {
                device_id: device_id.clone(),
                capability: capability.to_owned(),
                state: CapabilityState::Unknown,
            },
        );
    }

    pub(crate) fn set_value(&self, device_id: &DeviceId, capability: &str, value: AttributeValue) {
        self.capabilities.upsert(
            capability_key(device_id, capability),
            CapabilityRecord {
                device_id: device_id.clone(),
                capability: capability.to_owned(),
                state: CapabilityState::fresh(value),
            },
        );
    }

    pub(crate) fn mark_stale(&self, device_id: &DeviceId, capability: &str, reason: &str) {
        self.capabilities
            .update(&capability_key(device_id, capability), |record| CapabilityRecord {
                state: record.state.clone().into_stale(reason),
                ..record.clone()
            });
    }

    /// Every capability record of one device.
    pub fn device_capabilities(&self, device_id: &DeviceId) -> Vec<Arc<CapabilityRecord>> {
        self.capabilities
            .snapshot()
            .iter()
            .filter(|r| &r.device_id == device_id)
            .cloned()
            .collect()
    }

    pub fn capabilities_snapshot(&self) -> Arc<Vec<Arc<CapabilityRecord>>> {
        self.capabilities.snapshot()
    }

    pub fn subscribe_capabilities(&self) -> SnapshotStream<CapabilityRecord> {
        SnapshotStream::new(self.capabilities.subscribe())
    }

    pub fn capability_count(&self) -> usize {
        self.capabilities.len()
    }

    // ── Device status ────────────────────────────────────────────────

    pub fn device_status(&self, device_id: &DeviceId) -> Option<Arc<DeviceStatus>> {
        self.devices.get(device_id)
    }

    pub(crate) fn put_device_status(&self, status: DeviceStatus) {
        self.devices.upsert(status.device_id.clone(), status);
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<DeviceStatus>>> {
        self.devices.snapshot()
    }

    pub fn subscribe_devices(&self) -> SnapshotStream<DeviceStatus> {
        SnapshotStream::new(self.devices.subscribe())
    }

    /// Forget everything about a device.
    pub(crate) fn remove_device(&self, device_id: &DeviceId) {
        self.capabilities.remove_where(|(owner, _)| owner == device_id);
        self.devices.remove(device_id);
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn capability_lifecycle() {
        let store = DataStore::new();
        let dev = DeviceId::from("dev");

        store.init_capability(&dev, "onoff");
        assert_eq!(store.capability_state(&dev, "onoff"), Some(CapabilityState::Unknown));

        store.set_value(&dev, "onoff", AttributeValue::Bool(true));
        assert!(store.capability_state(&dev, "onoff").unwrap().is_fresh());

        store.mark_stale(&dev, "onoff", "timeout");
        let state = store.capability_state(&dev, "onoff").unwrap();
        assert!(!state.is_fresh());
        assert_eq!(state.value(), Some(&AttributeValue::Bool(true)));
    }

    #[test]
    fn remove_device_keeps_other_devices() {
        let store = DataStore::new();
        let a = DeviceId::from("a");
        let ab = DeviceId::from("ab");
        store.init_capability(&a, "onoff");
        store.init_capability(&ab, "onoff");
        store.remove_device(&a);
        assert!(store.capability_state(&a, "onoff").is_none());
        assert!(store.capability_state(&ab, "onoff").is_some());
        assert_eq!(store.device_capabilities(&ab).len(), 1);
    }

    #[test]
    fn remove_device_ignores_ids_sharing_a_path_prefix() {
        let store = DataStore::new();
        let hub = DeviceId::from("hub");
        let child = DeviceId::from("hub/2");
        store.init_capability(&hub, "onoff");
        store.init_capability(&child, "onoff");
        store.remove_device(&hub);
        assert!(store.capability_state(&hub, "onoff").is_none());
        assert_eq!(store.capability_state(&child, "onoff"), Some(CapabilityState::Unknown));
    }

    #[test]
    fn separator_in_ids_does_not_alias_records() {
        let store = DataStore::new();
        let left = DeviceId::from("a");
        let right = DeviceId::from("a/b");
        store.set_value(&left, "b/c", AttributeValue::Int(1));
        store.set_value(&right, "c", AttributeValue::Int(2));
        assert_eq!(store.capability_count(), 2);
        assert_eq!(
            store.capability_state(&left, "b/c").unwrap().value(),
            Some(&AttributeValue::Int(1))
        );
        assert_eq!(
            store.capability_state(&right, "c").unwrap().value(),
            Some(&AttributeValue::Int(2))
        );
    }

    #[test]
    fn stale_on_unknown_key_is_ignored() {
        let store = DataStore::new();
        store.mark_stale(&DeviceId::from("dev"), "nope", "timeout");
        assert_eq!(store.capability_count(), 0);
    }
}
