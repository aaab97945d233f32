//! Leader cache - tracks the leaders learned from redirects.
//!
//! Two mappings are kept: device → endpoint for data writes, and a single
//! meta-leader endpoint for schema and storage-group operations. Entries are
//! only ever written by redirect handling; the last redirect wins and nothing
//! is evicted.

use std::collections::HashMap;

use strata_core::{DeviceId, Endpoint};
use tokio::sync::RwLock;
use tracing::debug;

/// Cache of known leaders.
///
/// A miss is a normal outcome: the caller falls back to the default
/// connection.
#[derive(Debug, Default)]
pub struct LeaderCache {
    /// Leader by device.
    devices: RwLock<HashMap<DeviceId, Endpoint>>,
    /// Meta leader; `None` means the default endpoint.
    meta: RwLock<Option<Endpoint>>,
}

impl LeaderCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached leader for a device, if known.
    pub async fn lookup_device(&self, device_id: &DeviceId) -> Option<Endpoint> {
        self.devices.read().await.get(device_id).cloned()
    }

    /// Records the leader for a device, returning the previous entry.
    pub async fn record_device(&self, device_id: DeviceId, leader: Endpoint) -> Option<Endpoint> {
        debug!(device = %device_id, leader = %leader, "caching device leader");
        self.devices.write().await.insert(device_id, leader)
    }

    /// Records several device leaders under a single write lock.
    pub async fn record_devices(&self, entries: Vec<(DeviceId, Endpoint)>) {
        let mut devices = self.devices.write().await;
        for (device_id, leader) in entries {
            debug!(device = %device_id, leader = %leader, "caching device leader");
            devices.insert(device_id, leader);
        }
    }

    /// Returns the meta leader, if one was learned.
    pub async fn meta_leader(&self) -> Option<Endpoint> {
        self.meta.read().await.clone()
    }

    /// Records the meta leader.
    pub async fn record_meta_leader(&self, leader: Endpoint) {
        debug!(leader = %leader, "caching meta leader");
        *self.meta.write().await = Some(leader);
    }

    /// Returns the number of cached devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Returns true if no device leader is cached.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Returns a copy of the device mappings.
    pub async fn snapshot(&self) -> HashMap<DeviceId, Endpoint> {
        self.devices.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn test_lookup_miss_is_none() {
        let cache = LeaderCache::new();
        assert!(cache.is_empty().await);
        assert_eq!(cache.lookup_device(&DeviceId::from("root.sg1.d1")).await, None);
        assert_eq!(cache.meta_leader().await, None);
    }

    #[tokio::test]
    async fn test_record_and_lookup() {
        let cache = LeaderCache::new();
        let device = DeviceId::from("root.sg2.d1");

        let previous = cache.record_device(device.clone(), endpoint(55561)).await;

        assert_eq!(previous, None);
        assert_eq!(cache.lookup_device(&device).await, Some(endpoint(55561)));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_last_redirect_wins() {
        let cache = LeaderCache::new();
        let device = DeviceId::from("root.sg2.d1");

        cache.record_device(device.clone(), endpoint(55561)).await;
        let previous = cache.record_device(device.clone(), endpoint(55562)).await;

        assert_eq!(previous, Some(endpoint(55561)));
        assert_eq!(cache.lookup_device(&device).await, Some(endpoint(55562)));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_record_devices() {
        let cache = LeaderCache::new();
        cache
            .record_devices(vec![
                (DeviceId::from("root.sg2.d1"), endpoint(55561)),
                (DeviceId::from("root.sg3.d1"), endpoint(55562)),
                (DeviceId::from("root.sg4.d1"), endpoint(55563)),
            ])
            .await;

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[&DeviceId::from("root.sg3.d1")], endpoint(55562));
    }

    #[tokio::test]
    async fn test_meta_leader_is_independent_of_devices() {
        let cache = LeaderCache::new();
        cache.record_meta_leader(endpoint(55561)).await;

        assert_eq!(cache.meta_leader().await, Some(endpoint(55561)));
        assert!(cache.is_empty().await);

        cache.record_meta_leader(endpoint(55562)).await;
        assert_eq!(cache.meta_leader().await, Some(endpoint(55562)));
    }
}
