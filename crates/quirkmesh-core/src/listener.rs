// ── Notification listeners ──
//
// Tracks which (device, cluster) pairs have a live notification
// listener. A `Subscription` is the only way to hold one, and dropping
// it unregisters, so a removed device cannot leave listeners behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use quirkmesh_api::ClusterId;
use tracing::trace;

use crate::model::DeviceId;

type ListenerKey = (DeviceId, ClusterId);

#[derive(Debug, Default)]
struct Listeners {
    active: DashMap<ListenerKey, u64>,
    next_token: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Listeners>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, replacing any previous one for the pair.
    pub fn subscribe(&self, device_id: DeviceId, cluster: ClusterId) -> Subscription {
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let key = (device_id, cluster);
        trace!(device = %key.0, %cluster, token, "listener registered");
        self.inner.active.insert(key.clone(), token);
        Subscription {
            registry: Arc::downgrade(&self.inner),
            key,
            token,
        }
    }

    pub fn is_listening(&self, device_id: &DeviceId, cluster: ClusterId) -> bool {
        self.inner.active.contains_key(&(device_id.clone(), cluster))
    }

    /// Live listeners across all devices.
    pub fn len(&self) -> usize {
        self.inner.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.active.is_empty()
    }

    pub fn device_listeners(&self, device_id: &DeviceId) -> usize {
        self.inner
            .active
            .iter()
            .filter(|entry| &entry.key().0 == device_id)
            .count()
    }
}

/// Handle keeping one listener registered.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Listeners>,
    key: ListenerKey,
    token: u64,
}

impl Subscription {
    pub fn cluster(&self) -> ClusterId {
        self.key.1
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.registry.upgrade() {
            // A newer subscription for the same pair owns the slot now.
            listeners
                .active
                .remove_if(&self.key, |_, token| *token == self.token);
            trace!(device = %self.key.0, cluster = %self.key.1, "listener released");
        }
    }
}
