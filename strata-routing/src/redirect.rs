//! Redirect interpretation.
//!
//! A node that is not the leader for a request answers with a [`Redirect`].
//! The collaborator layer decides its shape from the operation kind: a single
//! endpoint for single-target and flat-batch requests, a per-device map for
//! tablet maps. [`interpret`] turns the raw redirect into a [`RedirectPlan`]
//! the router can act on, dropping hints that name no routable node.

use std::collections::BTreeMap;

use strata_core::{DeviceId, Endpoint};
use tracing::warn;

/// Redirect signal carried by a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Retry the whole request against this node.
    Endpoint(Endpoint),
    /// Different devices of the request belong to different leaders.
    PerDevice(BTreeMap<DeviceId, Endpoint>),
}

impl Redirect {
    /// Builds a per-device redirect.
    #[must_use]
    pub fn per_device(entries: impl IntoIterator<Item = (DeviceId, Endpoint)>) -> Self {
        Self::PerDevice(entries.into_iter().collect())
    }
}

/// What the router should do with a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectPlan {
    /// Retry against one endpoint.
    Single(Endpoint),
    /// Record each device's leader. Entries are ordered by device.
    PerDevice(Vec<(DeviceId, Endpoint)>),
    /// The redirect named no usable endpoint.
    Unusable,
}

/// Classifies a redirect and drops unroutable hints.
///
/// A wildcard host (`0.0.0.0`) means the server knew the request was
/// misrouted but had no address to offer.
#[must_use]
pub fn interpret(redirect: Redirect) -> RedirectPlan {
    match redirect {
        Redirect::Endpoint(endpoint) => {
            if endpoint.is_unspecified() {
                warn!(endpoint = %endpoint, "ignoring redirect to unspecified address");
                RedirectPlan::Unusable
            } else {
                RedirectPlan::Single(endpoint)
            }
        }
        Redirect::PerDevice(map) => {
            let total = map.len();
            let entries: Vec<_> = map
                .into_iter()
                .filter(|(_, endpoint)| !endpoint.is_unspecified())
                .collect();
            if entries.len() < total {
                warn!(
                    dropped = total - entries.len(),
                    "ignoring per-device redirect entries with unspecified address"
                );
            }
            if entries.is_empty() {
                RedirectPlan::Unusable
            } else {
                RedirectPlan::PerDevice(entries)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_endpoint() {
        let endpoint = Endpoint::new("127.0.0.1", 55561);
        assert_eq!(
            interpret(Redirect::Endpoint(endpoint.clone())),
            RedirectPlan::Single(endpoint)
        );
    }

    #[test]
    fn test_unspecified_single_is_unusable() {
        let redirect = Redirect::Endpoint(Endpoint::new("0.0.0.0", 6667));
        assert_eq!(interpret(redirect), RedirectPlan::Unusable);
    }

    #[test]
    fn test_per_device_is_ordered_and_filtered() {
        let redirect = Redirect::per_device([
            (DeviceId::from("root.sg3.d1"), Endpoint::new("127.0.0.1", 55562)),
            (DeviceId::from("root.sg2.d1"), Endpoint::new("127.0.0.1", 55561)),
            (DeviceId::from("root.sg4.d1"), Endpoint::new("0.0.0.0", 55563)),
        ]);

        let RedirectPlan::PerDevice(entries) = interpret(redirect) else {
            panic!("expected per-device plan");
        };
        let devices: Vec<_> = entries.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(devices, vec!["root.sg2.d1", "root.sg3.d1"]);
    }

    #[test]
    fn test_empty_per_device_is_unusable() {
        assert_eq!(
            interpret(Redirect::PerDevice(BTreeMap::new())),
            RedirectPlan::Unusable
        );
    }
}
