//! In-crate fake connector for unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use strata_core::{ConnectionError, ConnectionResult, Endpoint};

use crate::connection::{Connection, Connector, Reply, Request};

type Responder = dyn Fn(&Endpoint, &Request) -> ConnectionResult<Reply> + Send + Sync;

pub fn endpoint(port: u16) -> Endpoint {
    Endpoint::new("127.0.0.1", port)
}

/// Connector whose connections answer through a shared responder closure.
pub struct FakeConnector {
    pub connects: AtomicUsize,
    pub close_attempts: Arc<AtomicUsize>,
    refused: Mutex<HashSet<Endpoint>>,
    stalled: Mutex<HashSet<Endpoint>>,
    failing_close: Mutex<HashSet<Endpoint>>,
    responder: Arc<Responder>,
    /// `(endpoint, operation)` for every executed request, in order.
    pub executed: Arc<Mutex<Vec<(Endpoint, &'static str)>>>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self::with_responder(|_, _| Ok(Reply::Applied))
    }
}

impl FakeConnector {
    pub fn with_responder(
        responder: impl Fn(&Endpoint, &Request) -> ConnectionResult<Reply> + Send + Sync + 'static,
    ) -> Self {
        Self {
            connects: AtomicUsize::new(0),
            close_attempts: Arc::new(AtomicUsize::new(0)),
            refused: Mutex::new(HashSet::new()),
            stalled: Mutex::new(HashSet::new()),
            failing_close: Mutex::new(HashSet::new()),
            responder: Arc::new(responder),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn refuse(&self, endpoint: Endpoint) {
        self.refused.lock().unwrap().insert(endpoint);
    }

    pub fn fail_close(&self, endpoint: Endpoint) {
        self.failing_close.lock().unwrap().insert(endpoint);
    }

    pub fn accept(&self, endpoint: &Endpoint) {
        self.refused.lock().unwrap().remove(endpoint);
    }

    /// Makes connects to `endpoint` hang forever once counted.
    pub fn stall(&self, endpoint: Endpoint) {
        self.stalled.lock().unwrap().insert(endpoint);
    }
}

pub struct FakeConnection {
    endpoint: Endpoint,
    fail_close: bool,
    close_attempts: Arc<AtomicUsize>,
    responder: Arc<Responder>,
    executed: Arc<Mutex<Vec<(Endpoint, &'static str)>>>,
}

#[async_trait]
impl Connection for FakeConnection {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn execute(&self, request: &Request) -> ConnectionResult<Reply> {
        self.executed
            .lock()
            .unwrap()
            .push((self.endpoint.clone(), request.name()));
        (self.responder)(&self.endpoint, request)
    }

    async fn close(&self) -> ConnectionResult<()> {
        self.close_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(ConnectionError::Transport {
                endpoint: self.endpoint.clone(),
                reason: "socket already reset".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(&self, endpoint: &Endpoint) -> ConnectionResult<FakeConnection> {
        if self.refused.lock().unwrap().contains(endpoint) {
            return Err(ConnectionError::ConnectFailed {
                endpoint: endpoint.clone(),
                reason: "connection refused".to_string(),
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let stalled = self.stalled.lock().unwrap().contains(endpoint);
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(FakeConnection {
            endpoint: endpoint.clone(),
            fail_close: self.failing_close.lock().unwrap().contains(endpoint),
            close_attempts: Arc::clone(&self.close_attempts),
            responder: Arc::clone(&self.responder),
            executed: Arc::clone(&self.executed),
        })
    }
}
