//! Router - sends writes and schema changes to the node that leads them.
//!
//! The router combines the leader cache (device → endpoint, plus the meta
//! leader) with the connection pool (endpoint → connection) and follows the
//! redirects nodes answer with.
//!
//! # Dispatch
//!
//! Every request takes one of three paths, chosen by [`Request::route`]:
//!
//! - **Single target** (schema changes, one record, one device's rows, one
//!   tablet): on a redirect, cache the named leader and retry there once.
//! - **Device map** (several tablets): a redirect carries a leader per device.
//!   Every entry is cached in one pass and no retry is made.
//! - **Flat batch** (records spanning devices): a redirect names one node for
//!   the whole batch. The batch is split by device and each sub-batch is
//!   resubmitted on the single-target path, so each device's own leader gets
//!   learned.
//!
//! A retry is never followed by another, and whatever it answers the call
//! completes. Errors reach the caller only from the first attempt or from
//! connecting to the redirect target.
//!
//! # Leader caching disabled
//!
//! With caching off the router holds only its default connection. No cache,
//! meta leader or pool is allocated, and redirects are absorbed without a
//! retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use strata_core::{
    ConnectionResult, DeviceId, DeviceRecords, Endpoint, Record, Row, RouterConfig, Tablet,
    TimeseriesSchema, Value,
};
use tracing::{debug, info, warn};

use crate::connection::{Connection, Connector, Reply, Request, Route};
use crate::error::{RouterError, RouterResult, SubBatchFailure};
use crate::leader_cache::LeaderCache;
use crate::pool::ConnectionPool;
use crate::redirect::{interpret, RedirectPlan};
use crate::splitter::{is_single_device, split_by_device};

/// Leader tracking state, present only when caching is enabled.
struct Leaders<C: Connector> {
    cache: LeaderCache,
    pool: ConnectionPool<C>,
}

/// Whose leader a single-target request needs.
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Meta,
    Device(&'a DeviceId),
}

/// Routes requests to cluster leaders, learning them from redirects.
pub struct Router<C: Connector> {
    config: RouterConfig,
    /// Connection to the configured endpoint. Never replaced.
    default: Arc<C::Connection>,
    leaders: Option<Leaders<C>>,
    closed: AtomicBool,
}

impl<C: Connector> Router<C> {
    /// Opens a router: connects to the configured endpoint and, if leader
    /// caching is enabled, allocates the cache and the pool.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Config` for an invalid configuration and
    /// `RouterError::Connection` if the default connection cannot be opened.
    pub async fn open(config: RouterConfig, connector: C) -> RouterResult<Self> {
        config.validate()?;

        let connector = Arc::new(connector);
        let default = Arc::new(connector.connect(&config.endpoint).await?);
        let leaders = config.enable_leader_cache.then(|| Leaders {
            cache: LeaderCache::new(),
            pool: ConnectionPool::with_connection(Arc::clone(&connector), Arc::clone(&default)),
        });

        info!(
            endpoint = %config.endpoint,
            leader_cache = config.enable_leader_cache,
            "router opened"
        );

        Ok(Self {
            config,
            default,
            leaders,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Returns the connection to the configured endpoint.
    #[must_use]
    pub const fn default_connection(&self) -> &Arc<C::Connection> {
        &self.default
    }

    /// Returns the leader cache, or `None` when caching is disabled.
    #[must_use]
    pub fn device_cache(&self) -> Option<&LeaderCache> {
        self.leaders.as_ref().map(|leaders| &leaders.cache)
    }

    /// Returns the connection pool, or `None` when caching is disabled.
    #[must_use]
    pub fn pool(&self) -> Option<&ConnectionPool<C>> {
        self.leaders.as_ref().map(|leaders| &leaders.pool)
    }

    /// Returns the connection schema operations are sent to.
    ///
    /// This is the default connection until a schema operation is redirected.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Connection` if the meta leader's connection had
    /// to be reopened and could not be.
    pub async fn meta_connection(&self) -> RouterResult<Arc<C::Connection>> {
        Ok(self.resolve(Target::Meta).await?)
    }

    /// Returns true once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes every connection the router holds. Closing twice is a no-op.
    ///
    /// Close failures are logged, never returned. Callers must not run
    /// operations concurrently with `close`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        match &self.leaders {
            Some(leaders) => {
                leaders.pool.close_all().await;
            }
            None => {
                if let Err(e) = self.default.close().await {
                    warn!(
                        endpoint = %self.config.endpoint,
                        error = %e,
                        "failed to close connection"
                    );
                }
            }
        }
        info!(endpoint = %self.config.endpoint, "router closed");
    }

    // ------------------------------------------------------------------------
    // Schema operations
    // ------------------------------------------------------------------------

    /// Creates a storage group.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Connection` on transport or server failure.
    pub async fn set_storage_group(&self, storage_group: &str) -> RouterResult<()> {
        self.submit(Request::SetStorageGroup(storage_group.to_string()))
            .await
    }

    /// Deletes one storage group.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Connection` on transport or server failure.
    pub async fn delete_storage_group(&self, storage_group: &str) -> RouterResult<()> {
        self.delete_storage_groups(vec![storage_group.to_string()])
            .await
    }

    /// Deletes storage groups.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Connection` on transport or server failure.
    pub async fn delete_storage_groups(&self, storage_groups: Vec<String>) -> RouterResult<()> {
        self.submit(Request::DeleteStorageGroups(storage_groups)).await
    }

    /// Creates a timeseries.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Connection` on transport or server failure.
    pub async fn create_timeseries(&self, schema: TimeseriesSchema) -> RouterResult<()> {
        self.submit(Request::CreateTimeseries(schema)).await
    }

    /// Creates several timeseries in one request.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Connection` on transport or server failure.
    pub async fn create_multi_timeseries(
        &self,
        schemas: Vec<TimeseriesSchema>,
    ) -> RouterResult<()> {
        self.submit(Request::CreateMultiTimeseries(schemas)).await
    }

    /// Deletes timeseries by path.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Connection` on transport or server failure.
    pub async fn delete_timeseries(&self, paths: Vec<String>) -> RouterResult<()> {
        self.submit(Request::DeleteTimeseries(paths)).await
    }

    // ------------------------------------------------------------------------
    // Data operations
    // ------------------------------------------------------------------------

    /// Inserts one row with typed values.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::InvalidInput` if measurement and value counts
    /// differ, `RouterError::Connection` on transport or server failure.
    pub async fn insert_record(
        &self,
        device_id: impl Into<DeviceId>,
        timestamp: i64,
        measurements: Vec<String>,
        values: Vec<Value>,
    ) -> RouterResult<()> {
        let row = Row::typed(timestamp, measurements, values)?;
        self.submit(Request::InsertRecord(Record::new(device_id, row)))
            .await
    }

    /// Inserts one row whose values the server parses from strings.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::InvalidInput` if measurement and value counts
    /// differ, `RouterError::Connection` on transport or server failure.
    pub async fn insert_string_record(
        &self,
        device_id: impl Into<DeviceId>,
        timestamp: i64,
        measurements: Vec<String>,
        values: Vec<String>,
    ) -> RouterResult<()> {
        let row = Row::untyped(timestamp, measurements, values)?;
        self.submit(Request::InsertRecord(Record::new(device_id, row)))
            .await
    }

    /// Inserts records that may span devices, typed or not.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::PartialBatch` if the batch was split after a
    /// redirect and some sub-batches failed, `RouterError::Connection` if the
    /// batch failed as a whole.
    pub async fn insert_records(&self, records: Vec<Record>) -> RouterResult<()> {
        self.submit(Request::InsertRecords(records)).await
    }

    /// Inserts several rows into one device.
    ///
    /// Unless `sorted` is set, rows are first sorted by timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Connection` on transport or server failure.
    pub async fn insert_records_of_one_device(
        &self,
        mut records: DeviceRecords,
        sorted: bool,
    ) -> RouterResult<()> {
        if !sorted {
            records.sort_by_time();
        }
        self.submit(Request::InsertRecordsOfOneDevice(records)).await
    }

    /// Inserts a tablet.
    ///
    /// Unless `sorted` is set, rows are first sorted by timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Connection` on transport or server failure.
    pub async fn insert_tablet(&self, mut tablet: Tablet, sorted: bool) -> RouterResult<()> {
        if !sorted {
            tablet.sort_by_time();
        }
        self.submit(Request::InsertTablet(tablet)).await
    }

    /// Inserts several tablets in one request.
    ///
    /// Unless `sorted` is set, each tablet is first sorted by timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Connection` on transport or server failure,
    /// including failing to connect to a leader named by a redirect.
    pub async fn insert_tablets(&self, mut tablets: Vec<Tablet>, sorted: bool) -> RouterResult<()> {
        if !sorted {
            tablets.iter_mut().for_each(Tablet::sort_by_time);
        }
        self.submit(Request::InsertTablets(tablets)).await
    }

    /// Routes any request by its shape.
    ///
    /// Requests carrying nothing to apply return immediately.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Closed` after `close`, otherwise as documented on
    /// the typed operations.
    #[tracing::instrument(skip_all, name = "router_submit", fields(op = request.name()))]
    pub async fn submit(&self, request: Request) -> RouterResult<()> {
        if self.is_closed() {
            return Err(RouterError::Closed);
        }
        if request.is_empty() {
            debug!("empty request, nothing to send");
            return Ok(());
        }

        match request.route() {
            Route::Meta => Ok(self.execute_single(Target::Meta, &request).await?),
            Route::Device(device_id) => {
                Ok(self.execute_single(Target::Device(device_id), &request).await?)
            }
            Route::DeviceMap(tablets) => Ok(self.execute_device_map(tablets, &request).await?),
            Route::FlatBatch(records) => self.execute_flat_batch(records, &request).await,
        }
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Returns the connection currently believed to lead `target`.
    async fn resolve(&self, target: Target<'_>) -> ConnectionResult<Arc<C::Connection>> {
        let Some(leaders) = &self.leaders else {
            return Ok(Arc::clone(&self.default));
        };

        let cached = match target {
            Target::Meta => leaders.cache.meta_leader().await,
            Target::Device(device_id) => leaders.cache.lookup_device(device_id).await,
        };
        match cached {
            Some(endpoint) => leaders.pool.get(&endpoint).await,
            None => Ok(Arc::clone(&self.default)),
        }
    }

    /// Single-target path: execute, and on a redirect retry once.
    async fn execute_single(&self, target: Target<'_>, request: &Request) -> ConnectionResult<()> {
        let connection = self.resolve(target).await?;
        let Reply::Redirect(redirect) = connection.execute(request).await? else {
            return Ok(());
        };
        let Some(leaders) = &self.leaders else {
            debug!(from = %connection.endpoint(), "leader cache disabled, redirect absorbed");
            return Ok(());
        };

        match interpret(redirect) {
            RedirectPlan::Single(endpoint) => self.follow_redirect(target, endpoint, request).await,
            RedirectPlan::PerDevice(entries) => {
                debug!(op = request.name(), "per-device redirect for single target, caching only");
                self.record_device_map(leaders, entries).await
            }
            RedirectPlan::Unusable => Ok(()),
        }
    }

    /// Caches `endpoint` as the leader of `target` and executes there once.
    ///
    /// Only a failure to connect is returned. Whatever the retry itself
    /// answers, the call completes.
    async fn follow_redirect(
        &self,
        target: Target<'_>,
        endpoint: Endpoint,
        request: &Request,
    ) -> ConnectionResult<()> {
        let Some(leaders) = &self.leaders else {
            return Ok(());
        };

        // Cache only once a connection exists, so a dead hint is never cached.
        let connection = leaders.pool.get(&endpoint).await?;
        match target {
            Target::Meta => leaders.cache.record_meta_leader(endpoint).await,
            Target::Device(device_id) => {
                leaders.cache.record_device(device_id.clone(), endpoint).await;
            }
        }

        match connection.execute(request).await {
            Ok(Reply::Applied) => {}
            Ok(Reply::Redirect(redirect)) => warn!(
                op = request.name(),
                at = %connection.endpoint(),
                redirect = ?redirect,
                "redirected again after retry, not following"
            ),
            Err(e) => warn!(
                op = request.name(),
                at = %connection.endpoint(),
                error = %e,
                "retry after redirect failed, not reported"
            ),
        }
        Ok(())
    }

    /// Device-map path: execute once, cache every leader a redirect names.
    async fn execute_device_map(
        &self,
        tablets: &[Tablet],
        request: &Request,
    ) -> ConnectionResult<()> {
        let connection = match tablets.first() {
            Some(tablet) => self.resolve(Target::Device(tablet.device_id())).await?,
            None => Arc::clone(&self.default),
        };
        let Reply::Redirect(redirect) = connection.execute(request).await? else {
            return Ok(());
        };
        let Some(leaders) = &self.leaders else {
            debug!(from = %connection.endpoint(), "leader cache disabled, redirect absorbed");
            return Ok(());
        };

        match interpret(redirect) {
            RedirectPlan::PerDevice(entries) => self.record_device_map(leaders, entries).await,
            RedirectPlan::Single(endpoint) => {
                warn!(
                    endpoint = %endpoint,
                    "single-endpoint redirect for a device map, not following"
                );
                Ok(())
            }
            RedirectPlan::Unusable => Ok(()),
        }
    }

    /// Opens a connection per distinct leader, then caches every entry.
    ///
    /// Nothing is cached if any leader cannot be reached.
    async fn record_device_map(
        &self,
        leaders: &Leaders<C>,
        entries: Vec<(DeviceId, Endpoint)>,
    ) -> ConnectionResult<()> {
        let mut endpoints: Vec<&Endpoint> = entries.iter().map(|(_, endpoint)| endpoint).collect();
        endpoints.sort();
        endpoints.dedup();
        for endpoint in endpoints {
            leaders.pool.get(endpoint).await?;
        }

        debug!(devices = entries.len(), "caching per-device redirect");
        leaders.cache.record_devices(entries).await;
        Ok(())
    }

    /// Flat-batch path: execute whole; on a redirect split by device and
    /// resubmit each sub-batch on the single-target path.
    async fn execute_flat_batch(&self, records: &[Record], request: &Request) -> RouterResult<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let connection = self.resolve(Target::Device(&first.device_id)).await?;
        let Reply::Redirect(redirect) = connection.execute(request).await? else {
            return Ok(());
        };
        let Some(leaders) = &self.leaders else {
            debug!(from = %connection.endpoint(), "leader cache disabled, redirect absorbed");
            return Ok(());
        };

        let endpoint = match interpret(redirect) {
            RedirectPlan::Single(endpoint) => endpoint,
            RedirectPlan::PerDevice(entries) => {
                return Ok(self.record_device_map(leaders, entries).await?);
            }
            RedirectPlan::Unusable => return Ok(()),
        };

        // The hint is exact when there is only one device.
        if is_single_device(records) {
            return Ok(self
                .follow_redirect(Target::Device(&first.device_id), endpoint, request)
                .await?);
        }

        let sub_batches = split_by_device(records);
        let total = sub_batches.len();
        debug!(
            sub_batches = total,
            hint = %endpoint,
            "splitting redirected batch by device"
        );

        let mut failures = Vec::new();
        for sub_batch in sub_batches {
            let sub_request = Request::InsertRecords(sub_batch.records);
            let result = self
                .execute_single(Target::Device(&sub_batch.device_id), &sub_request)
                .await;
            if let Err(error) = result {
                warn!(device = %sub_batch.device_id, error = %error, "sub-batch failed");
                failures.push(SubBatchFailure {
                    device_id: sub_batch.device_id,
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RouterError::PartialBatch {
                sub_batches: total,
                failures,
            })
        }
    }
}

impl<C: Connector> std::fmt::Debug for Router<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("leader_cache", &self.leaders.is_some())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
