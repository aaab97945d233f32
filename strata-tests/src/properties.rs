//! Property definitions and checkers for router tests.
//!
//! Properties are invariants that must hold after every router call against
//! a simulated cluster. Checkers compare the router's cache and pool with the
//! cluster's leadership and delivery log.

use std::collections::HashSet;

use strata_core::{DeviceId, Endpoint};
use strata_routing::{Request, Route, Router};

use crate::simulated_cluster::{Delivery, SimulatedCluster, SimulatedConnector};

/// Router under test.
pub type SimulatedRouter = Router<SimulatedConnector>;

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violation of a router property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// Leader tracking state exists although caching is disabled.
    AllocatedWhileDisabled,
    /// A cached leader differs from the cluster's leader.
    StaleCacheEntry {
        /// The device.
        device: DeviceId,
        /// Endpoint the router cached.
        cached: Endpoint,
        /// Endpoint that actually leads the device.
        leader: Endpoint,
    },
    /// A device that should have been learned is not cached.
    MissingCacheEntry {
        /// The device.
        device: DeviceId,
    },
    /// More connections were opened than the pool holds.
    RedundantConnect {
        /// Successful connects seen by the cluster.
        connects: usize,
        /// Connections held by the pool.
        pooled: usize,
    },
    /// The pool lost connections before close.
    PoolShrank {
        /// Size at the previous observation.
        before: usize,
        /// Size now.
        after: usize,
    },
    /// A call reached the cluster more often than one retry allows.
    ExcessRetries {
        /// Operation name.
        op: &'static str,
        /// Deliveries allowed.
        allowed: usize,
        /// Deliveries seen.
        actual: usize,
    },
}

impl std::fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllocatedWhileDisabled => {
                write!(f, "Leader cache or pool allocated with caching disabled")
            }
            Self::StaleCacheEntry {
                device,
                cached,
                leader,
            } => write!(f, "Device {device} cached at {cached}, led by {leader}"),
            Self::MissingCacheEntry { device } => write!(f, "Device {device} not cached"),
            Self::RedundantConnect { connects, pooled } => {
                write!(f, "{connects} connects for {pooled} pooled connections")
            }
            Self::PoolShrank { before, after } => {
                write!(f, "Pool shrank from {before} to {after} before close")
            }
            Self::ExcessRetries {
                op,
                allowed,
                actual,
            } => write!(f, "{op} delivered {actual} times, at most {allowed} allowed"),
        }
    }
}

// ============================================================================
// Retry Bound
// ============================================================================

/// Returns how many deliveries one call of `request` may cause.
///
/// Single-target calls get one retry. Device maps are never retried. A flat
/// batch gets one whole-batch attempt plus one retried attempt per device.
#[must_use]
pub fn delivery_budget(request: &Request) -> usize {
    match request.route() {
        Route::Meta | Route::Device(_) => 2,
        Route::DeviceMap(_) => 1,
        Route::FlatBatch(records) => {
            let devices: HashSet<_> = records.iter().map(|r| &r.device_id).collect();
            if devices.len() <= 1 {
                2
            } else {
                1 + 2 * devices.len()
            }
        }
    }
}

/// Checks that one call stayed within its delivery budget.
#[must_use]
pub fn check_retry_bound(request: &Request, deliveries: &[Delivery]) -> Option<PropertyViolation> {
    let allowed = delivery_budget(request);
    (deliveries.len() > allowed).then(|| PropertyViolation::ExcessRetries {
        op: request.name(),
        allowed,
        actual: deliveries.len(),
    })
}

// ============================================================================
// Property Checker
// ============================================================================

/// Tracks router state across calls for property verification.
#[derive(Debug, Default)]
pub struct PropertyChecker {
    /// Pool size at the last observation.
    last_pool_len: usize,
    /// Violations found.
    violations: Vec<PropertyViolation>,
}

impl PropertyChecker {
    /// Creates a new property checker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks all properties that hold after any call and returns new
    /// violations.
    ///
    /// Call this after each router call.
    pub async fn check_all(
        &mut self,
        router: &SimulatedRouter,
        cluster: &SimulatedCluster,
    ) -> Vec<PropertyViolation> {
        let mut violations = Vec::new();

        if router.config().enable_leader_cache {
            violations.extend(check_cache_matches_leaders(router, cluster).await);
            violations.extend(check_no_redundant_connects(router, cluster).await);
            violations.extend(self.check_pool_monotonic(router).await);
        } else {
            violations.extend(check_disabled_allocates_nothing(router));
        }

        self.violations.extend(violations.clone());
        violations
    }

    /// Checks that the pool never shrinks between observations.
    pub async fn check_pool_monotonic(
        &mut self,
        router: &SimulatedRouter,
    ) -> Option<PropertyViolation> {
        let pool = router.pool()?;
        let len = pool.len().await;
        let before = std::mem::replace(&mut self.last_pool_len, len);
        (len < before).then_some(PropertyViolation::PoolShrank { before, after: len })
    }

    /// Returns every violation seen so far.
    #[must_use]
    pub fn violations(&self) -> &[PropertyViolation] {
        &self.violations
    }
}

/// Checks that disabled caching left no cache or pool behind.
#[must_use]
pub fn check_disabled_allocates_nothing(router: &SimulatedRouter) -> Option<PropertyViolation> {
    (router.device_cache().is_some() || router.pool().is_some())
        .then_some(PropertyViolation::AllocatedWhileDisabled)
}

/// Checks that every cached leader is the cluster's current leader.
pub async fn check_cache_matches_leaders(
    router: &SimulatedRouter,
    cluster: &SimulatedCluster,
) -> Vec<PropertyViolation> {
    let Some(cache) = router.device_cache() else {
        return Vec::new();
    };

    let mut entries: Vec<_> = cache.snapshot().await.into_iter().collect();
    entries.sort();
    entries
        .into_iter()
        .filter_map(|(device, cached)| {
            let leader = cluster.leader_of(&device);
            (cached != leader).then_some(PropertyViolation::StaleCacheEntry {
                device,
                cached,
                leader,
            })
        })
        .collect()
}

/// Checks that each of `devices` is cached.
pub async fn check_devices_learned(
    router: &SimulatedRouter,
    devices: &[DeviceId],
) -> Vec<PropertyViolation> {
    let Some(cache) = router.device_cache() else {
        return Vec::new();
    };

    let mut violations = Vec::new();
    for device in devices {
        if cache.lookup_device(device).await.is_none() {
            violations.push(PropertyViolation::MissingCacheEntry {
                device: device.clone(),
            });
        }
    }
    violations
}

/// Checks that every connect produced a pooled connection.
pub async fn check_no_redundant_connects(
    router: &SimulatedRouter,
    cluster: &SimulatedCluster,
) -> Option<PropertyViolation> {
    let pooled = router.pool()?.len().await;
    let connects = cluster.connect_count();
    (connects > pooled).then_some(PropertyViolation::RedundantConnect { connects, pooled })
}
