//! API gateway admin client.
//!
//! Publishes a service, its route and a JWT auth plugin so that a
//! synthesized gateway URI resolves to the instance's first address.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use mep_core::RouteInfo;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};

use super::JSON_CONTENT_TYPE;
use crate::appconf::GatewaySettings;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("route {name} has no upstream uri")]
    MissingUpstream { name: String },
    #[error("invalid gateway port {port:?}")]
    InvalidPort { port: String },
    #[error("gateway request {method} {url} failed with status {status}")]
    Status {
        method: Method,
        url: String,
        status: u16,
    },
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Gateway operations used while publishing address-style endpoints.
#[async_trait]
pub trait GatewayRegistrar: Send + Sync {
    /// `POST /services {url, name}`.
    async fn add_service(&self, route: &RouteInfo) -> Result<(), GatewayError>;

    /// `POST /services/{name}/routes {paths, name}`.
    async fn add_route(&self, route: &RouteInfo) -> Result<(), GatewayError>;

    /// `POST /routes/{name}/plugins` with the JWT plugin.
    async fn enable_jwt_plugin(&self, route: &RouteInfo) -> Result<(), GatewayError>;

    /// `DELETE /services/{name}/routes/{name}`.
    async fn delete_route(&self, ser_name: &str) -> Result<(), GatewayError>;
}

/// Kong-style admin API client.
#[derive(Debug, Clone)]
pub struct KongClient {
    base_url: String,
    http: reqwest::Client,
}

impl KongClient {
    /// Client for `base_url` (scheme, host and port, no trailing slash).
    #[must_use]
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    /// HTTPS client for the configured gateway using the shared TLS config.
    ///
    /// When `apigw_host` is an IP literal the connection is addressed by
    /// `server_name` and resolved to that IP, so certificate checks run
    /// against the configured name.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the port is invalid or the HTTP client
    /// cannot be built.
    pub fn from_settings(
        settings: &GatewaySettings,
        tls: &Arc<rustls::ClientConfig>,
    ) -> Result<Self, GatewayError> {
        let port: u16 = settings
            .apigw_port
            .parse()
            .map_err(|_| GatewayError::InvalidPort {
                port: settings.apigw_port.clone(),
            })?;

        let mut builder = reqwest::Client::builder().use_preconfigured_tls((**tls).clone());
        let host = match settings.apigw_host.parse::<IpAddr>() {
            Ok(ip) if !settings.server_name.is_empty() => {
                builder = builder.resolve(&settings.server_name, SocketAddr::new(ip, port));
                settings.server_name.as_str()
            }
            _ => settings.apigw_host.as_str(),
        };
        let http = builder.build()?;
        Ok(Self::new(format!("https://{host}:{port}"), http))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), GatewayError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE);
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                method,
                url,
                status: status.as_u16(),
            });
        }
        let text = response.text().await.unwrap_or_default();
        info!(%method, %url, "gateway request accepted");
        debug!(response = %text, "gateway response");
        Ok(())
    }
}

#[async_trait]
impl GatewayRegistrar for KongClient {
    async fn add_service(&self, route: &RouteInfo) -> Result<(), GatewayError> {
        let name = route.ser_name();
        let upstream = route
            .upstream()
            .ok_or_else(|| GatewayError::MissingUpstream {
                name: name.to_string(),
            })?;
        self.send(
            Method::POST,
            "/services",
            Some(json!({ "url": upstream, "name": name })),
        )
        .await
    }

    async fn add_route(&self, route: &RouteInfo) -> Result<(), GatewayError> {
        let name = route.ser_name();
        self.send(
            Method::POST,
            &format!("/services/{name}/routes"),
            Some(json!({ "paths": [format!("/{name}")], "name": name })),
        )
        .await
    }

    async fn enable_jwt_plugin(&self, route: &RouteInfo) -> Result<(), GatewayError> {
        self.send(
            Method::POST,
            &format!("/routes/{}/plugins", route.ser_name()),
            Some(json!({ "name": "jwt", "config": { "claims_to_verify": ["exp"] } })),
        )
        .await
    }

    async fn delete_route(&self, ser_name: &str) -> Result<(), GatewayError> {
        self.send(
            Method::DELETE,
            &format!("/services/{ser_name}/routes/{ser_name}"),
            None,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
