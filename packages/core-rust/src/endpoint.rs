//! Endpoint planning.
//!
//! Works out which endpoint strings an instance is registered with and,
//! for address-style endpoints, the gateway route that has to exist for the
//! synthesized URI to resolve. Planning is pure; publishing the route is
//! the caller's job.

use serde::{Deserialize, Serialize};

use crate::types::ServiceInfo;

/// Default externally reachable gateway authority.
pub const DEFAULT_GATEWAY_AUTHORITY: &str = "mep-api-gw.mep:8443";

/// Length of the unique suffix appended to gateway service names.
pub const GATEWAY_SUFFIX_LEN: usize = 20;

/// Route id sent with every gateway route.
///
/// The gateway ignores it and keys routes by name, so every route carries
/// the same value.
pub const GATEWAY_ROUTE_ID: i64 = 1;

/// Tag recorded under the `endPointType` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Uris,
    Addresses,
    Alternative,
}

impl EndpointKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uris => "uris",
            Self::Addresses => "addresses",
            Self::Alternative => "alternative",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "uris" => Some(Self::Uris),
            "addresses" => Some(Self::Addresses),
            "alternative" => Some(Self::Alternative),
            _ => None,
        }
    }
}

/// Service published to the gateway for an address-style endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfo {
    #[serde(rename = "routeId")]
    pub id: i64,
    pub app_id: String,
    pub ser_info: SerInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerInfo {
    pub ser_name: String,
    pub uris: Vec<String>,
}

impl RouteInfo {
    /// Gateway-side service and route name.
    #[must_use]
    pub fn ser_name(&self) -> &str {
        &self.ser_info.ser_name
    }

    /// Upstream URL the gateway proxies to.
    #[must_use]
    pub fn upstream(&self) -> Option<&str> {
        self.ser_info.uris.first().map(String::as_str)
    }
}

/// Endpoint strings plus the tag describing them. `kind` is `None` when the
/// description carries no endpoint data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEndpoints {
    pub endpoints: Vec<String>,
    pub kind: Option<EndpointKind>,
}

impl ResolvedEndpoints {
    /// Value stored under `endPointType`; empty when there is no endpoint data.
    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        self.kind.map_or("", EndpointKind::as_str)
    }
}

/// Outcome of endpoint planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPlan {
    pub resolved: ResolvedEndpoints,
    /// Route to publish before the synthesized URI is usable.
    pub route: Option<RouteInfo>,
}

/// Plans endpoints for `info`. First match wins:
///
/// 1. explicit URIs, returned as-is;
/// 2. addresses, replaced by one gateway URI
///    `https://{gateway_authority}/{serName}{suffix}` with a route to the
///    first address;
/// 3. the alternative document, serialized to a single JSON string;
/// 4. nothing.
///
/// `suffix` is truncated to [`GATEWAY_SUFFIX_LEN`] characters.
#[must_use]
pub fn plan_endpoints(info: &ServiceInfo, gateway_authority: &str, suffix: &str) -> EndpointPlan {
    let endpoint = &info.transport_info.endpoint;

    if !endpoint.uris.is_empty() {
        return EndpointPlan {
            resolved: ResolvedEndpoints {
                endpoints: endpoint.uris.clone(),
                kind: Some(EndpointKind::Uris),
            },
            route: None,
        };
    }

    if let Some(address) = endpoint.addresses.first() {
        let suffix: String = suffix.chars().take(GATEWAY_SUFFIX_LEN).collect();
        let ser_name = format!("{}{}", info.ser_name, suffix);
        let route = RouteInfo {
            id: GATEWAY_ROUTE_ID,
            app_id: suffix,
            ser_info: SerInfo {
                ser_name: ser_name.clone(),
                uris: vec![format!("http://{}:{}/", address.host, address.port)],
            },
        };
        return EndpointPlan {
            resolved: ResolvedEndpoints {
                endpoints: vec![format!("https://{gateway_authority}/{ser_name}")],
                kind: Some(EndpointKind::Uris),
            },
            route: Some(route),
        };
    }

    if let Some(alternative) = &endpoint.alternative {
        // Value -> string serialization is infallible.
        let text = alternative.to_string();
        return EndpointPlan {
            resolved: ResolvedEndpoints {
                endpoints: vec![text],
                kind: Some(EndpointKind::Alternative),
            },
            route: None,
        };
    }

    EndpointPlan {
        resolved: ResolvedEndpoints::default(),
        route: None,
    }
}

/// Splits `host:port`. A missing or unparsable port yields 0.
#[must_use]
pub fn split_host_port(endpoint: &str) -> (String, u32) {
    let trimmed = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest)
        .trim_end_matches('/');
    match trimmed.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(0)),
        None => (trimmed.to_string(), 0),
    }
}
