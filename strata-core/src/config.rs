//! Router configuration.
//!
//! All defaults are named constants so callers and tests can refer to them.

use crate::error::ConfigError;
use crate::types::Endpoint;

/// Default entry-point host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default entry-point port.
pub const DEFAULT_PORT: u16 = 6667;

/// Leader caching is on unless explicitly disabled.
pub const LEADER_CACHE_ENABLED_DEFAULT: bool = true;

/// Configuration for a router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Entry endpoint; the default connection is opened against it.
    pub endpoint: Endpoint,
    /// Whether to learn and cache leaders from redirects.
    ///
    /// When disabled the router keeps no cache, no meta-leader reference and
    /// no connection pool, and absorbs redirects without retrying.
    pub enable_leader_cache: bool,
}

impl RouterConfig {
    /// Creates a configuration for the given entry endpoint.
    #[must_use]
    pub const fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            enable_leader_cache: LEADER_CACHE_ENABLED_DEFAULT,
        }
    }

    /// Creates a configuration from a `host:port` string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEndpoint` if the string does not parse.
    pub fn from_addr(addr: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(addr.parse()?))
    }

    /// Enables or disables leader caching.
    #[must_use]
    pub const fn with_leader_cache(mut self, enabled: bool) -> Self {
        self.enable_leader_cache = enabled;
        self
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEndpoint` if the entry endpoint has an
    /// empty host, a zero port, or a wildcard host.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason| ConfigError::InvalidEndpoint {
            input: self.endpoint.to_string(),
            reason,
        };
        if self.endpoint.host().is_empty() {
            return Err(invalid("empty host"));
        }
        if self.endpoint.port() == 0 {
            return Err(invalid("port must be non-zero"));
        }
        if self.endpoint.is_unspecified() {
            return Err(invalid("wildcard host is not routable"));
        }
        Ok(())
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new(Endpoint::new(DEFAULT_HOST, DEFAULT_PORT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.endpoint, Endpoint::new("127.0.0.1", 6667));
        assert!(config.enable_leader_cache);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RouterConfig::from_addr("10.0.0.1:55560")
            .unwrap()
            .with_leader_cache(false);
        assert_eq!(config.endpoint.port(), 55560);
        assert!(!config.enable_leader_cache);
    }

    #[test]
    fn test_validate_rejects_unusable_endpoints() {
        let wildcard = RouterConfig::new(Endpoint::new("0.0.0.0", 6667));
        assert!(matches!(
            wildcard.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));

        let zero_port = RouterConfig::new(Endpoint::new("127.0.0.1", 0));
        assert!(zero_port.validate().is_err());

        let empty_host = RouterConfig::new(Endpoint::new("", 6667));
        assert!(empty_host.validate().is_err());
    }
}
