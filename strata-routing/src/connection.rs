//! Connection capability consumed by the router.
//!
//! The router never speaks a wire protocol itself. It hands a [`Request`] to a
//! [`Connection`] and interprets the [`Reply`]. Implementations live outside
//! this crate: a production RPC client, or the simulated cluster used by the
//! integration tests.
//!
//! # Design
//!
//! A redirect is a reply, not an error. `execute` returns
//! `Ok(Reply::Redirect(..))` when the node is not the leader for the request,
//! and `Err(ConnectionError)` only for transport or server failures.

use async_trait::async_trait;
use strata_core::{
    ConnectionResult, DeviceId, DeviceRecords, Endpoint, Record, Tablet, TimeseriesSchema,
};

use crate::redirect::Redirect;

/// An operation the router can send to a cluster node.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Creates a storage group.
    SetStorageGroup(String),
    /// Deletes storage groups.
    DeleteStorageGroups(Vec<String>),
    /// Creates one timeseries.
    CreateTimeseries(TimeseriesSchema),
    /// Creates several timeseries.
    CreateMultiTimeseries(Vec<TimeseriesSchema>),
    /// Deletes timeseries by path.
    DeleteTimeseries(Vec<String>),
    /// Inserts one row into one device.
    InsertRecord(Record),
    /// Inserts rows that may span devices.
    InsertRecords(Vec<Record>),
    /// Inserts several rows into one device.
    InsertRecordsOfOneDevice(DeviceRecords),
    /// Inserts one tablet.
    InsertTablet(Tablet),
    /// Inserts several tablets, usually one per device.
    InsertTablets(Vec<Tablet>),
}

/// How the router resolves the target of a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Route<'a> {
    /// Schema and storage-group operations go to the meta leader.
    Meta,
    /// Everything in the request belongs to one device.
    Device(&'a DeviceId),
    /// One payload per device; redirects arrive as a per-device map.
    DeviceMap(&'a [Tablet]),
    /// A flat list of rows that may span devices.
    FlatBatch(&'a [Record]),
}

impl Request {
    /// Classifies the request for routing.
    #[must_use]
    pub fn route(&self) -> Route<'_> {
        match self {
            Self::SetStorageGroup(_)
            | Self::DeleteStorageGroups(_)
            | Self::CreateTimeseries(_)
            | Self::CreateMultiTimeseries(_)
            | Self::DeleteTimeseries(_) => Route::Meta,
            Self::InsertRecord(record) => Route::Device(&record.device_id),
            Self::InsertRecordsOfOneDevice(batch) => Route::Device(batch.device_id()),
            Self::InsertTablet(tablet) => Route::Device(tablet.device_id()),
            Self::InsertTablets(tablets) => Route::DeviceMap(tablets),
            Self::InsertRecords(records) => Route::FlatBatch(records),
        }
    }

    /// Returns the operation name, for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetStorageGroup(_) => "set_storage_group",
            Self::DeleteStorageGroups(_) => "delete_storage_groups",
            Self::CreateTimeseries(_) => "create_timeseries",
            Self::CreateMultiTimeseries(_) => "create_multi_timeseries",
            Self::DeleteTimeseries(_) => "delete_timeseries",
            Self::InsertRecord(_) => "insert_record",
            Self::InsertRecords(_) => "insert_records",
            Self::InsertRecordsOfOneDevice(_) => "insert_records_of_one_device",
            Self::InsertTablet(_) => "insert_tablet",
            Self::InsertTablets(_) => "insert_tablets",
        }
    }

    /// Returns true if the request carries nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::SetStorageGroup(_) | Self::CreateTimeseries(_) | Self::InsertRecord(_) => false,
            Self::DeleteStorageGroups(groups) => groups.is_empty(),
            Self::CreateMultiTimeseries(schemas) => schemas.is_empty(),
            Self::DeleteTimeseries(paths) => paths.is_empty(),
            Self::InsertRecords(records) => records.is_empty(),
            Self::InsertRecordsOfOneDevice(batch) => batch.is_empty(),
            Self::InsertTablet(tablet) => tablet.is_empty(),
            Self::InsertTablets(tablets) => tablets.iter().all(Tablet::is_empty),
        }
    }
}

/// Outcome of a request that reached a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The node applied the request.
    Applied,
    /// The node is not the leader; nothing was applied.
    Redirect(Redirect),
}

/// An established session with one cluster node.
///
/// Implementations must be `Send + Sync`: the router shares one connection
/// between concurrent callers.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Returns the endpoint this connection is bound to.
    fn endpoint(&self) -> &Endpoint;

    /// Executes a request.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::Transport` if the request or its response was
    /// lost, `ConnectionError::Server` if the node rejected it and
    /// `ConnectionError::Closed` after `close`.
    async fn execute(&self, request: &Request) -> ConnectionResult<Reply>;

    /// Closes the connection. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the session could not be released cleanly.
    async fn close(&self) -> ConnectionResult<()>;
}

/// Opens connections to endpoints.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced.
    type Connection: Connection;

    /// Opens a connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::ConnectFailed` if no session could be
    /// established.
    async fn connect(&self, endpoint: &Endpoint) -> ConnectionResult<Self::Connection>;
}

#[cfg(test)]
mod tests {
    use strata_core::{DataType, MeasurementSchema, Row};

    use super::*;

    fn record(device: &str) -> Record {
        let row = Row::untyped(1, vec!["s1".to_string()], vec!["1".to_string()]).unwrap();
        Record::new(device, row)
    }

    #[test]
    fn test_schema_requests_route_to_meta() {
        let requests = [
            Request::SetStorageGroup("root.sg1".to_string()),
            Request::DeleteStorageGroups(vec!["root.sg1".to_string()]),
            Request::CreateTimeseries(TimeseriesSchema::new("root.sg1.d1.s1", DataType::Int64)),
            Request::CreateMultiTimeseries(Vec::new()),
            Request::DeleteTimeseries(vec!["root.sg1.d1.s1".to_string()]),
        ];
        for request in &requests {
            assert_eq!(request.route(), Route::Meta, "{}", request.name());
        }
    }

    #[test]
    fn test_device_requests_route_to_device() {
        let request = Request::InsertRecord(record("root.sg2.d1"));
        assert_eq!(request.route(), Route::Device(&DeviceId::from("root.sg2.d1")));

        let tablet = Tablet::new(
            "root.sg3.d1",
            vec![MeasurementSchema::new("s1", DataType::Int64)],
            10,
        );
        let request = Request::InsertTablet(tablet);
        assert_eq!(request.route(), Route::Device(&DeviceId::from("root.sg3.d1")));

        let request = Request::InsertRecordsOfOneDevice(DeviceRecords::new("root.sg4.d1"));
        assert_eq!(request.route(), Route::Device(&DeviceId::from("root.sg4.d1")));
    }

    #[test]
    fn test_batch_requests_route_by_shape() {
        let records = vec![record("root.sg1.d1"), record("root.sg2.d1")];
        let request = Request::InsertRecords(records);
        assert!(matches!(request.route(), Route::FlatBatch(rows) if rows.len() == 2));

        let request = Request::InsertTablets(Vec::new());
        assert!(matches!(request.route(), Route::DeviceMap(tablets) if tablets.is_empty()));
    }

    #[test]
    fn test_is_empty() {
        assert!(Request::InsertRecords(Vec::new()).is_empty());
        assert!(Request::DeleteStorageGroups(Vec::new()).is_empty());
        assert!(!Request::SetStorageGroup("root.sg1".to_string()).is_empty());
        assert!(!Request::InsertRecords(vec![record("root.sg1.d1")]).is_empty());

        let empty_tablet = Tablet::new(
            "root.sg1.d1",
            vec![MeasurementSchema::new("s1", DataType::Int64)],
            10,
        );
        assert!(Request::InsertTablets(vec![empty_tablet.clone()]).is_empty());
        assert!(Request::InsertTablet(empty_tablet).is_empty());
    }
}
