//! Endpoint resolution and instance encoding with gateway publishing.
//!
//! Planning endpoints is pure (see [`mep_core::endpoint`]). This module adds
//! the side effect: when a plan carries a gateway route, the route is
//! published before the synthesized URI is handed back. Publishing is best
//! effort; failures are logged and never reach the caller.

use std::sync::Arc;
use std::time::SystemTime;

use mep_core::endpoint::DEFAULT_GATEWAY_AUTHORITY;
use mep_core::{encode_instance, plan_endpoints, MicroServiceInstance, ResolvedEndpoints, RouteInfo, ServiceInfo};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::extif::GatewayRegistrar;

/// Resolves a service's endpoint list, publishing gateway routes for
/// address-style endpoints.
pub struct EndpointResolver {
    public_authority: String,
    gateway: Option<Arc<dyn GatewayRegistrar>>,
}

impl EndpointResolver {
    /// `public_authority` is the `host:port` written into synthesized URIs.
    /// Without a gateway, routes are planned but not published.
    #[must_use]
    pub fn new(public_authority: impl Into<String>, gateway: Option<Arc<dyn GatewayRegistrar>>) -> Self {
        Self {
            public_authority: public_authority.into(),
            gateway,
        }
    }

    #[must_use]
    pub fn public_authority(&self) -> &str {
        &self.public_authority
    }

    /// Endpoint strings and kind for `info`, first match wins: URIs,
    /// addresses (one gateway URI, route published), alternative, nothing.
    pub async fn resolve(&self, info: &ServiceInfo) -> ResolvedEndpoints {
        let suffix = Uuid::new_v4().simple().to_string();
        let plan = plan_endpoints(info, &self.public_authority, &suffix);
        if let Some(route) = &plan.route {
            self.publish(route).await;
        }
        plan.resolved
    }

    /// Resolves endpoints and encodes `info` into a registry instance.
    ///
    /// See [`encode_instance`] for the liveness-interval rewrite applied to `info`.
    pub async fn encode(&self, info: &mut ServiceInfo) -> MicroServiceInstance {
        let resolved = self.resolve(info).await;
        encode_instance(info, resolved, SystemTime::now())
    }

    /// Publishes service, route and JWT plugin. Each call is attempted even
    /// if an earlier one failed.
    async fn publish(&self, route: &RouteInfo) {
        let Some(gateway) = &self.gateway else {
            warn!(service = route.ser_name(), "no api gateway configured, route not published");
            return;
        };

        if let Err(e) = gateway.add_service(route).await {
            error!(service = route.ser_name(), error = %e, "add api gateway service failed");
        }
        if let Err(e) = gateway.add_route(route).await {
            error!(service = route.ser_name(), error = %e, "add api gateway route failed");
        }
        if let Err(e) = gateway.enable_jwt_plugin(route).await {
            error!(service = route.ser_name(), error = %e, "enable api gateway jwt plugin failed");
        }
        info!(service = route.ser_name(), "api gateway route published");
    }
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self::new(DEFAULT_GATEWAY_AUTHORITY, None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
