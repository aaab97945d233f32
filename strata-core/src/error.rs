//! Error types shared by the router and its collaborators.
//!
//! Following `TigerStyle`: all errors must be handled explicitly.
//! A redirect is not an error and never appears here; it is a reply.

use thiserror::Error;

use crate::record::DataType;
use crate::types::{DeviceId, Endpoint};

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Failures raised by a connection collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// No session could be established with the endpoint.
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectFailed {
        /// The endpoint we tried to reach.
        endpoint: Endpoint,
        /// Why the attempt failed.
        reason: String,
    },

    /// The request or its response was lost in transit.
    #[error("transport failure with {endpoint}: {reason}")]
    Transport {
        /// The endpoint the request was sent to.
        endpoint: Endpoint,
        /// Why the transport failed.
        reason: String,
    },

    /// The server executed the request and rejected it.
    #[error("server {endpoint} rejected request (status {code}): {message}")]
    Server {
        /// The endpoint that rejected the request.
        endpoint: Endpoint,
        /// Server status code.
        code: i32,
        /// Server message.
        message: String,
    },

    /// The connection was already closed.
    #[error("connection to {0} is closed")]
    Closed(Endpoint),
}

impl ConnectionError {
    /// Returns the endpoint this error concerns.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        match self {
            Self::ConnectFailed { endpoint, .. }
            | Self::Transport { endpoint, .. }
            | Self::Server { endpoint, .. }
            | Self::Closed(endpoint) => endpoint,
        }
    }
}

/// Malformed input rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// A row names a different number of measurements than it has values.
    #[error("row at timestamp {timestamp} has {measurements} measurements but {values} values")]
    MeasurementCountMismatch {
        /// Row timestamp.
        timestamp: i64,
        /// Number of measurements.
        measurements: usize,
        /// Number of values.
        values: usize,
    },

    /// A tablet row has the wrong number of columns.
    #[error("tablet for {device} has {expected} columns, row has {actual}")]
    ColumnCountMismatch {
        /// Tablet device.
        device: DeviceId,
        /// Columns in the tablet schema.
        expected: usize,
        /// Values in the row.
        actual: usize,
    },

    /// A value does not match the declared measurement type.
    #[error("measurement {measurement} expects {expected:?}, got {actual:?}")]
    TypeMismatch {
        /// Measurement name.
        measurement: String,
        /// Declared type.
        expected: DataType,
        /// Type of the supplied value.
        actual: DataType,
    },

    /// The tablet has no room for another row.
    #[error("tablet for {device} is full ({capacity} rows)")]
    TabletFull {
        /// Tablet device.
        device: DeviceId,
        /// Row capacity.
        capacity: usize,
    },

    /// A device-scoped batch contains a row for another device.
    #[error("batch for {expected} contains a row for {actual}")]
    ForeignDevice {
        /// The batch device.
        expected: DeviceId,
        /// The offending row's device.
        actual: DeviceId,
    },
}

/// Invalid router configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An endpoint string could not be parsed or is unusable.
    #[error("invalid endpoint '{input}': {reason}")]
    InvalidEndpoint {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::Server {
            endpoint: Endpoint::new("127.0.0.1", 6667),
            code: 301,
            message: "storage group not set".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("127.0.0.1:6667"));
        assert!(msg.contains("301"));
        assert!(msg.contains("storage group not set"));
    }

    #[test]
    fn test_connection_error_endpoint() {
        let endpoint = Endpoint::new("10.0.0.2", 6667);
        let err = ConnectionError::Closed(endpoint.clone());
        assert_eq!(err.endpoint(), &endpoint);
    }

    #[test]
    fn test_record_error_display() {
        let err = RecordError::MeasurementCountMismatch {
            timestamp: 7,
            measurements: 3,
            values: 2,
        };
        assert_eq!(
            format!("{err}"),
            "row at timestamp 7 has 3 measurements but 2 values"
        );
    }
}
