//! Strongly-typed identifiers for cluster nodes and devices.
//!
//! Both identifiers are used as map keys by the router, so equality and
//! hashing are by value.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Network identity of one cluster node.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Creates a new endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns true if the host is a wildcard address.
    ///
    /// Servers answer with a wildcard host when they know a redirect is
    /// needed but have no routable address to offer.
    #[must_use]
    pub fn is_unspecified(&self) -> bool {
        matches!(self.host.as_str(), "0.0.0.0" | "::" | "[::]")
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint({}:{})", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    /// Parses `host:port`. IPv6 hosts must be bracketed (`[::1]:6667`).
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ConfigError::InvalidEndpoint {
            input: input.to_string(),
            reason,
        };

        let (host, port) = input.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
            return Err(invalid("IPv6 host must be bracketed"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
        if port == 0 {
            return Err(invalid("port must be non-zero"));
        }

        Ok(Self::new(host, port))
    }
}

/// Full path of a device, e.g. `root.sg1.d1`.
///
/// The router keys its leader cache by device.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device ID from its path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the device path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device({})", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for DeviceId {
    fn from(path: String) -> Self {
        Self(path)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_endpoint_equality_by_value() {
        let a = Endpoint::new("127.0.0.1", 6667);
        let b = Endpoint::new(String::from("127.0.0.1"), 6667);
        assert_eq!(a, b);

        let mut map = HashMap::new();
        map.insert(a, 1);
        assert_eq!(map.get(&b), Some(&1));
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::new("10.0.0.5", 6667);
        assert_eq!(format!("{endpoint}"), "10.0.0.5:6667");
        assert_eq!(format!("{endpoint:?}"), "endpoint(10.0.0.5:6667)");
    }

    #[test]
    fn test_endpoint_parse() {
        let endpoint: Endpoint = "node-3.cluster:6668".parse().unwrap();
        assert_eq!(endpoint.host(), "node-3.cluster");
        assert_eq!(endpoint.port(), 6668);

        let v6: Endpoint = "[::1]:6667".parse().unwrap();
        assert_eq!(v6.host(), "[::1]");
    }

    #[test]
    fn test_endpoint_parse_rejects_malformed() {
        for input in ["localhost", ":6667", "host:port", "host:0", "::1:6667", "host:70000"] {
            let result = input.parse::<Endpoint>();
            assert!(
                matches!(result, Err(ConfigError::InvalidEndpoint { .. })),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_endpoint_unspecified() {
        assert!(Endpoint::new("0.0.0.0", 6667).is_unspecified());
        assert!(Endpoint::new("::", 6667).is_unspecified());
        assert!(!Endpoint::new("127.0.0.1", 6667).is_unspecified());
    }

    #[test]
    fn test_device_id_display() {
        let device = DeviceId::from("root.sg1.d1");
        assert_eq!(format!("{device}"), "root.sg1.d1");
        assert_eq!(format!("{device:?}"), "device(root.sg1.d1)");
        assert_eq!(device.as_str(), "root.sg1.d1");
    }
}
