//! Connection pool - one live connection per endpoint.
//!
//! Connections are opened lazily on first use and kept until `close_all`.
//! A slow connect to one endpoint never delays callers of another.
//! The pool never holds two connections for the same endpoint and never
//! shrinks before it is closed.

use std::collections::HashMap;
use std::sync::Arc;

use strata_core::{ConnectionResult, Endpoint};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::connection::{Connection, Connector};

/// Slot for one endpoint. Empty while its first connect is in flight.
type Slot<C> = Arc<OnceCell<Arc<<C as Connector>::Connection>>>;

/// Pool of connections keyed by endpoint.
pub struct ConnectionPool<C: Connector> {
    /// Opens connections on a miss.
    connector: Arc<C>,
    /// Locked only to find or insert a slot, never across `connect`.
    /// Concurrent misses for one endpoint wait on that endpoint's slot.
    slots: Mutex<HashMap<Endpoint, Slot<C>>>,
}

impl<C: Connector> ConnectionPool<C> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(connector: Arc<C>) -> Self {
        Self {
            connector,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a pool already holding `connection`.
    #[must_use]
    pub fn with_connection(connector: Arc<C>, connection: Arc<C::Connection>) -> Self {
        let endpoint = connection.endpoint().clone();
        let slot = Arc::new(OnceCell::new_with(Some(connection)));
        Self {
            connector,
            slots: Mutex::new(HashMap::from([(endpoint, slot)])),
        }
    }

    /// Returns the connection for `endpoint`, opening it if needed.
    ///
    /// Only callers asking for the same endpoint wait on its connect.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::ConnectFailed` if a new connection could not
    /// be opened. The pool is left unchanged in that case.
    pub async fn get(&self, endpoint: &Endpoint) -> ConnectionResult<Arc<C::Connection>> {
        let slot = Arc::clone(self.slots.lock().await.entry(endpoint.clone()).or_default());
        if let Some(connection) = slot.get() {
            return Ok(Arc::clone(connection));
        }

        let opened = slot
            .get_or_try_init(|| async {
                self.connector.connect(endpoint).await.map(|connection| {
                    debug!(endpoint = %endpoint, "opened pooled connection");
                    Arc::new(connection)
                })
            })
            .await;

        match opened {
            Ok(connection) => Ok(Arc::clone(connection)),
            Err(e) => {
                self.discard_empty(endpoint, &slot).await;
                Err(e)
            }
        }
    }

    /// Drops `slot` after a failed connect unless another caller still
    /// waits on it.
    async fn discard_empty(&self, endpoint: &Endpoint, slot: &Slot<C>) {
        let mut slots = self.slots.lock().await;
        let unused = slots.get(endpoint).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && !slot.initialized() && Arc::strong_count(slot) == 2
        });
        if unused {
            slots.remove(endpoint);
        }
    }

    /// Returns true if a connection to `endpoint` is pooled.
    pub async fn contains(&self, endpoint: &Endpoint) -> bool {
        self.slots
            .lock()
            .await
            .get(endpoint)
            .is_some_and(|slot| slot.initialized())
    }

    /// Returns the number of pooled connections.
    pub async fn len(&self) -> usize {
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Returns true if the pool is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns the pooled endpoints, sorted.
    pub async fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<_> = self
            .slots
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(endpoint, _)| endpoint.clone())
            .collect();
        endpoints.sort();
        endpoints
    }

    /// Closes and removes every pooled connection.
    ///
    /// A failing close is logged and does not stop the remaining closes.
    /// Returns the number of connections that closed cleanly.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = self.slots.lock().await.drain().collect();
        let mut total = 0;
        let mut closed = 0;
        for (endpoint, slot) in drained {
            let Some(connection) = slot.get() else {
                continue;
            };
            total += 1;
            match connection.close().await {
                Ok(()) => closed += 1,
                Err(e) => warn!(endpoint = %endpoint, error = %e, "failed to close connection"),
            }
        }
        debug!(closed, total, "connection pool closed");
        closed
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool").finish_non_exhaustive()
    }
}
