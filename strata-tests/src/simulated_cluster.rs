//! Simulated cluster for router integration tests.
//!
//! The cluster assigns every device a leader node and answers requests the
//! way real nodes do: a node that does not lead a request replies with a
//! redirect naming the leader. Every delivery is logged so tests can check
//! where requests went and how often they were retried.
//!
//! # Leader assignment
//!
//! Devices under storage group `root.sgN` are led by node `N - 1` (modulo the
//! node count). Other devices are assigned by hash. Individual devices can be
//! moved with [`SimulatedCluster::move_leader`].
//!
//! # Redirect policies
//!
//! - [`RedirectPolicy::Always`]: every node redirects every request, even the
//!   leader. This is the harshest case for retry bounding.
//! - [`RedirectPolicy::UnlessLeader`]: a node applies requests it leads and
//!   redirects the rest.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use strata_core::{ConnectionError, ConnectionResult, DeviceId, Endpoint, Tablet};
use strata_routing::{Connection, Connector, Redirect, Reply, Request, Route};
use tracing::trace;

/// Host shared by all simulated nodes.
pub const SIMULATED_HOST: &str = "127.0.0.1";

/// Port of node 0; node `i` listens on `BASE_PORT + i`.
pub const BASE_PORT: u16 = 55560;

/// How nodes answer requests they receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Redirect every request, even at the leader.
    Always,
    /// Apply requests led by the receiving node, redirect the rest.
    UnlessLeader,
}

/// What a node did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The request was applied.
    Applied,
    /// The node answered with a redirect.
    Redirected,
    /// The request failed with an injected error.
    Failed,
}

/// One request delivered to a node.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Receiving node.
    pub endpoint: Endpoint,
    /// Operation name.
    pub op: &'static str,
    /// Devices the request touched, in request order, deduplicated.
    pub devices: Vec<DeviceId>,
    /// Number of rows carried.
    pub rows: usize,
    /// Whether tablet and one-device rows arrived sorted by timestamp.
    pub in_order: bool,
    /// What the node did.
    pub outcome: Outcome,
}

#[derive(Debug)]
struct ClusterState {
    nodes: Vec<Endpoint>,
    meta_leader: Endpoint,
    policy: RedirectPolicy,
    moved: HashMap<DeviceId, Endpoint>,
    unreachable: HashSet<Endpoint>,
    failing_devices: HashSet<DeviceId>,
    deliveries: Vec<Delivery>,
    connects: usize,
    closes: usize,
}

/// Shared handle to a simulated cluster.
#[derive(Debug, Clone)]
pub struct SimulatedCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl SimulatedCluster {
    /// Creates a cluster of `node_count` nodes. Node 1 leads metadata when
    /// there is more than one node.
    ///
    /// # Panics
    ///
    /// Panics if `node_count` is zero.
    #[must_use]
    pub fn new(node_count: u16, policy: RedirectPolicy) -> Self {
        assert!(node_count > 0, "cluster needs at least one node");
        let nodes: Vec<_> = (0..node_count).map(Self::node).collect();
        let meta_leader = nodes[usize::from(node_count > 1)].clone();
        Self {
            state: Arc::new(Mutex::new(ClusterState {
                nodes,
                meta_leader,
                policy,
                moved: HashMap::new(),
                unreachable: HashSet::new(),
                failing_devices: HashSet::new(),
                deliveries: Vec::new(),
                connects: 0,
                closes: 0,
            })),
        }
    }

    /// Returns the endpoint of node `index`.
    #[must_use]
    pub fn node(index: u16) -> Endpoint {
        Endpoint::new(SIMULATED_HOST, BASE_PORT + index)
    }

    /// Returns a connector for this cluster.
    #[must_use]
    pub fn connector(&self) -> SimulatedConnector {
        SimulatedConnector {
            cluster: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().expect("cluster state lock poisoned")
    }

    /// Returns the node leading `device`.
    #[must_use]
    pub fn leader_of(&self, device: &DeviceId) -> Endpoint {
        Self::leader_in(&self.lock(), device)
    }

    fn leader_in(state: &ClusterState, device: &DeviceId) -> Endpoint {
        if let Some(endpoint) = state.moved.get(device) {
            return endpoint.clone();
        }
        let count = state.nodes.len();
        let index = storage_group_number(device).map_or_else(
            || {
                let mut hasher = DefaultHasher::new();
                device.hash(&mut hasher);
                usize::try_from(hasher.finish() % count as u64).unwrap_or(0)
            },
            |group| (group + count - 1) % count,
        );
        state.nodes[index].clone()
    }

    /// Returns the node leading metadata.
    #[must_use]
    pub fn meta_leader(&self) -> Endpoint {
        self.lock().meta_leader.clone()
    }

    /// Moves a device's leadership to `endpoint`.
    pub fn move_leader(&self, device: &DeviceId, endpoint: Endpoint) {
        self.lock().moved.insert(device.clone(), endpoint);
    }

    /// Makes connecting to `endpoint` fail.
    pub fn set_unreachable(&self, endpoint: Endpoint) {
        self.lock().unreachable.insert(endpoint);
    }

    /// Makes every request touching `device` fail with a transport error.
    pub fn fail_device(&self, device: DeviceId) {
        self.lock().failing_devices.insert(device);
    }

    /// Returns every delivery so far.
    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.lock().deliveries.clone()
    }

    /// Forgets logged deliveries.
    pub fn clear_deliveries(&self) {
        self.lock().deliveries.clear();
    }

    /// Returns the number of successful connects.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    /// Returns the number of connection closes.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Answers one request at `at`, logging the delivery.
    fn handle(&self, at: &Endpoint, request: &Request) -> ConnectionResult<Reply> {
        let mut state = self.lock();
        let devices = devices_of(request);
        let rows = rows_of(request);
        let in_order = in_order(request);

        let fails = devices.iter().any(|d| state.failing_devices.contains(d));
        let (outcome, result) = if fails {
            let error = ConnectionError::Transport {
                endpoint: at.clone(),
                reason: "injected failure".to_string(),
            };
            (Outcome::Failed, Err(error))
        } else {
            match Self::redirect_for(&state, at, request) {
                Some(redirect) => (Outcome::Redirected, Ok(Reply::Redirect(redirect))),
                None => (Outcome::Applied, Ok(Reply::Applied)),
            }
        };

        trace!(endpoint = %at, op = request.name(), outcome = ?outcome, "delivery");
        state.deliveries.push(Delivery {
            endpoint: at.clone(),
            op: request.name(),
            devices,
            rows,
            in_order,
            outcome,
        });
        result
    }

    /// Returns the redirect a node at `at` answers with, if any.
    fn redirect_for(state: &ClusterState, at: &Endpoint, request: &Request) -> Option<Redirect> {
        let always = state.policy == RedirectPolicy::Always;
        match request.route() {
            Route::Meta => {
                (always || *at != state.meta_leader)
                    .then(|| Redirect::Endpoint(state.meta_leader.clone()))
            }
            Route::Device(device) => {
                let leader = Self::leader_in(state, device);
                (always || *at != leader).then_some(Redirect::Endpoint(leader))
            }
            Route::FlatBatch(records) => {
                let misrouted = records
                    .iter()
                    .any(|r| Self::leader_in(state, &r.device_id) != *at);
                let first = &records.first()?.device_id;
                (always || misrouted).then(|| Redirect::Endpoint(Self::leader_in(state, first)))
            }
            Route::DeviceMap(tablets) => {
                let leaders: Vec<_> = tablets
                    .iter()
                    .map(|t| (t.device_id().clone(), Self::leader_in(state, t.device_id())))
                    .collect();
                let misrouted = leaders.iter().any(|(_, leader)| leader != at);
                (always || misrouted).then(|| Redirect::per_device(leaders))
            }
        }
    }
}

/// Returns `N` for devices under `root.sgN`.
fn storage_group_number(device: &DeviceId) -> Option<usize> {
    let group = device.as_str().strip_prefix("root.sg")?;
    let digits: String = group.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok().filter(|&n| n > 0)
}

fn devices_of(request: &Request) -> Vec<DeviceId> {
    let mut devices: Vec<DeviceId> = match request {
        Request::InsertRecord(record) => vec![record.device_id.clone()],
        Request::InsertRecords(records) => records.iter().map(|r| r.device_id.clone()).collect(),
        Request::InsertRecordsOfOneDevice(batch) => vec![batch.device_id().clone()],
        Request::InsertTablet(tablet) => vec![tablet.device_id().clone()],
        Request::InsertTablets(tablets) => tablets.iter().map(|t| t.device_id().clone()).collect(),
        _ => Vec::new(),
    };
    let mut seen = HashSet::new();
    devices.retain(|d| seen.insert(d.clone()));
    devices
}

fn rows_of(request: &Request) -> usize {
    match request {
        Request::InsertRecord(_) => 1,
        Request::InsertRecords(records) => records.len(),
        Request::InsertRecordsOfOneDevice(batch) => batch.len(),
        Request::InsertTablet(tablet) => tablet.row_count(),
        Request::InsertTablets(tablets) => tablets.iter().map(|t| t.row_count()).sum(),
        _ => 0,
    }
}

fn in_order(request: &Request) -> bool {
    match request {
        Request::InsertRecordsOfOneDevice(batch) => batch.is_sorted(),
        Request::InsertTablet(tablet) => tablet.is_sorted(),
        Request::InsertTablets(tablets) => tablets.iter().all(Tablet::is_sorted),
        _ => true,
    }
}

/// Opens connections to a [`SimulatedCluster`].
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    cluster: SimulatedCluster,
}

#[async_trait]
impl Connector for SimulatedConnector {
    type Connection = SimulatedConnection;

    async fn connect(&self, endpoint: &Endpoint) -> ConnectionResult<SimulatedConnection> {
        let mut state = self.cluster.lock();
        if state.unreachable.contains(endpoint) || !state.nodes.contains(endpoint) {
            return Err(ConnectionError::ConnectFailed {
                endpoint: endpoint.clone(),
                reason: "connection refused".to_string(),
            });
        }
        state.connects += 1;
        drop(state);

        Ok(SimulatedConnection {
            endpoint: endpoint.clone(),
            cluster: self.cluster.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

/// A connection to one simulated node.
#[derive(Debug)]
pub struct SimulatedConnection {
    endpoint: Endpoint,
    cluster: SimulatedCluster,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for SimulatedConnection {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn execute(&self, request: &Request) -> ConnectionResult<Reply> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConnectionError::Closed(self.endpoint.clone()));
        }
        self.cluster.handle(&self.endpoint, request)
    }

    async fn close(&self) -> ConnectionResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.cluster.lock().closes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_group_leaders() {
        let cluster = SimulatedCluster::new(4, RedirectPolicy::Always);
        for (group, node) in [(1, 0), (2, 1), (3, 2), (4, 3), (5, 0)] {
            let device = DeviceId::new(format!("root.sg{group}.d1"));
            assert_eq!(cluster.leader_of(&device), SimulatedCluster::node(node));
        }
        assert_eq!(cluster.meta_leader(), SimulatedCluster::node(1));
    }

    #[test]
    fn test_move_leader() {
        let cluster = SimulatedCluster::new(4, RedirectPolicy::UnlessLeader);
        let device = DeviceId::from("root.sg2.d1");
        cluster.move_leader(&device, SimulatedCluster::node(3));
        assert_eq!(cluster.leader_of(&device), SimulatedCluster::node(3));
    }

    #[test]
    fn test_hashed_devices_stay_in_cluster() {
        let cluster = SimulatedCluster::new(3, RedirectPolicy::UnlessLeader);
        let leader = cluster.leader_of(&DeviceId::from("root.vehicle.d7"));
        assert!((0..3).map(SimulatedCluster::node).any(|n| n == leader));
        assert_eq!(storage_group_number(&DeviceId::from("root.sg0.d1")), None);
        assert_eq!(storage_group_number(&DeviceId::from("root.sg12.d1")), Some(12));
    }

    #[tokio::test]
    async fn test_unreachable_node_refuses_connect() {
        let cluster = SimulatedCluster::new(2, RedirectPolicy::UnlessLeader);
        cluster.set_unreachable(SimulatedCluster::node(1));
        let connector = cluster.connector();

        let result = connector.connect(&SimulatedCluster::node(1)).await;

        assert!(matches!(result, Err(ConnectionError::ConnectFailed { .. })));
        assert_eq!(cluster.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_requests() {
        let cluster = SimulatedCluster::new(1, RedirectPolicy::UnlessLeader);
        let connection = cluster
            .connector()
            .connect(&SimulatedCluster::node(0))
            .await
            .unwrap();

        connection.close().await.unwrap();
        connection.close().await.unwrap();

        let result = connection
            .execute(&Request::SetStorageGroup("root.sg1".to_string()))
            .await;
        assert!(matches!(result, Err(ConnectionError::Closed(_))));
        assert_eq!(cluster.close_count(), 1);
    }
}
