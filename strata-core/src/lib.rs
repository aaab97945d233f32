//! Strata Core - Identifiers, request data model and configuration.
//!
//! This crate holds the plain value types shared by the router and its
//! collaborators. It performs no I/O.
//!
//! # Design Principles (TigerStyle)
//!
//! - **Strongly-typed IDs**: An `Endpoint` is never confused with a `DeviceId`
//! - **Validate at construction**: Malformed rows and tablets are rejected
//!   before they reach the network
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod record;
mod types;

pub use config::{RouterConfig, DEFAULT_HOST, DEFAULT_PORT, LEADER_CACHE_ENABLED_DEFAULT};
pub use error::{ConfigError, ConnectionError, ConnectionResult, RecordError};
pub use record::{
    Compression, DataType, DeviceRecords, Encoding, MeasurementSchema, Record, Row, RowValues,
    Tablet, TimeseriesSchema, Value,
};
pub use types::{DeviceId, Endpoint};
