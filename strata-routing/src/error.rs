//! Router error types.
//!
//! Redirects never surface here: they are absorbed by the router after at
//! most one retry.

use strata_core::{ConfigError, ConnectionError, DeviceId, RecordError};
use thiserror::Error;

/// Result type for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

/// A sub-batch that failed while a flat batch was being re-routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubBatchFailure {
    /// Device of the failed sub-batch.
    pub device_id: DeviceId,
    /// Why it failed.
    pub error: ConnectionError,
}

/// Errors returned by the router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The router configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The input was rejected before anything was sent.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] RecordError),

    /// Connecting, sending, or executing failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Some sub-batches of a re-routed flat batch failed.
    ///
    /// Every sibling sub-batch was still attempted.
    #[error("{} of {sub_batches} sub-batches failed, first: {}", .failures.len(), first_failure(.failures))]
    PartialBatch {
        /// Number of sub-batches attempted.
        sub_batches: usize,
        /// The failed sub-batches in submission order.
        failures: Vec<SubBatchFailure>,
    },

    /// The router was closed.
    #[error("router is closed")]
    Closed,
}

fn first_failure(failures: &[SubBatchFailure]) -> String {
    failures.first().map_or_else(String::new, |failure| {
        format!("{}: {}", failure.device_id, failure.error)
    })
}
