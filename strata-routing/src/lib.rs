//! Strata Routing - Leader-caching write router.
//!
//! This crate routes schema and write requests to the cluster node that
//! leads them, without the caller knowing the cluster layout in advance.
//! Leaders are learned from the redirects nodes answer with.
//!
//! # Design (`TigerStyle`)
//!
//! - **Redirects are replies**: `Connection::execute` returns
//!   `Reply::Redirect`, never an error, when a node is not the leader
//! - **Bounded retries**: at most one redirect-triggered retry per level
//! - **Zero cost when disabled**: without leader caching no cache or pool
//!   exists at all

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod connection;
mod error;
mod leader_cache;
mod pool;
mod redirect;
mod router;
mod splitter;

#[cfg(test)]
mod test_support;

pub use connection::{Connection, Connector, Reply, Request, Route};
pub use error::{RouterError, RouterResult, SubBatchFailure};
pub use leader_cache::LeaderCache;
pub use pool::ConnectionPool;
pub use redirect::{interpret, Redirect, RedirectPlan};
pub use router::Router;
pub use splitter::{is_single_device, split_by_device, SubBatch};
