//! Strata Tests - Simulated-cluster testing for the Strata router.
//!
//! This crate contains the cross-crate tests for the router. Tests run the
//! real `Router` against a simulated cluster that answers with redirects the
//! way cluster nodes do.
//!
//! ## Test Organization
//!
//! **Integration Tests** (`*_tests.rs`): Router against a simulated cluster
//! - `router_tests`: every operation with leader caching on and off
//! - `convergence_tests`: leader learning, leader moves, partial failures and
//!   concurrent callers
//!
//! **Support Modules**:
//! - `simulated_cluster`: `SimulatedCluster` and its `Connector`
//! - `properties`: Property definitions (`StaleCacheEntry`, `ExcessRetries`, etc.)
//! - `scenarios`: Reusable workloads
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod scenarios;
pub mod simulated_cluster;


use tracing_subscriber::EnvFilter;

/// Installs a test-friendly fmt subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
