//! MP1 service-management pipelines and the request/response shapes they
//! share.
//!
//! - [`discover`]: `GET .../applications/{appInstanceId}/services`
//! - [`register`]: `POST .../applications/{appInstanceId}/services`

pub mod discover;
pub mod register;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method};
use mep_core::{ErrorCode, FindInstancesRequest, FindInstancesResponse, ProblemDetails, ServiceInfo};
use serde::Serialize;

use crate::codec::EndpointResolver;
use crate::extif::ApiHook;
use crate::pipeline::TaskError;
use crate::store::{InstanceStore, LocalIndex};

pub use discover::{discover_pipeline, DiscoverContext};
pub use register::{register_pipeline, RegisterContext};

/// Request headers read by the MP1 pipelines.
pub mod headers {
    pub const APP_INSTANCE_ID: &str = "x-appinstanceid";
    pub const CONSUMER_ID: &str = "x-consumerid";
    pub const CONSUMER_NAME: &str = "x-consumername";
    pub const DOMAIN_NAME: &str = "x-domain-name";
    pub const REAL_IP: &str = "x-real-ip";
    pub const FORWARDED_FOR: &str = "x-forwarded-for";
}

/// Consumer name the gateway uses when it queries on its own behalf.
pub const GATEWAY_CONSUMER: &str = "APIGW";

/// Value used for unset app ids, domains and projects.
pub const DEFAULT_SCOPE: &str = "default";

/// Decoded URL query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    /// Value for `key`, or `""` when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map_or("", String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<HashMap<String, String>> for QueryParams {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

/// Transport-neutral view of an inbound MP1 request.
#[derive(Debug, Clone, Default)]
pub struct MepRequest {
    pub method: Method,
    /// Request path, logged as the accessed resource.
    pub resource: String,
    pub headers: HeaderMap,
    /// `{appInstanceId}` path parameter.
    pub app_instance_id: String,
    /// `{project}` path parameter, when the route carries one.
    pub project: Option<String>,
    pub query: QueryParams,
    pub body: Bytes,
}

impl MepRequest {
    /// Header value as text, or `""` when absent or not UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// Client address from `X-Real-Ip`, else the first `X-Forwarded-For` hop.
    #[must_use]
    pub fn client_ip(&self) -> &str {
        let real_ip = self.header(headers::REAL_IP);
        if !real_ip.is_empty() {
            return real_ip;
        }
        self.header(headers::FORWARDED_FOR)
            .split(',')
            .next()
            .map_or("", str::trim)
    }

    /// Checks that the caller's app-instance header names the path's app instance.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorCode::AuthorizationValidate`] error on mismatch.
    pub fn validate_app_instance_id(&self) -> Result<(), TaskError> {
        if self.header(headers::APP_INSTANCE_ID) == self.app_instance_id {
            Ok(())
        } else {
            Err(TaskError::new(
                ErrorCode::AuthorizationValidate,
                "UnAuthorization to access the resource",
            ))
        }
    }
}

/// HTTP-shaped pipeline output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MepReply {
    pub status: u16,
    pub body: Bytes,
}

impl MepReply {
    /// JSON reply with `status`.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be encoded.
    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            status,
            body: Bytes::from(serde_json::to_vec(value)?),
        })
    }

    /// Problem-details reply for a recorded error.
    #[must_use]
    pub fn problem(err: &TaskError) -> Self {
        let details = ProblemDetails::new(err.code, err.message.clone());
        Self {
            status: details.status,
            body: serde_json::to_vec(&details).map(Bytes::from).unwrap_or_default(),
        }
    }
}

/// Request handed from a decode stage to its dispatcher.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CoreRequest {
    FindInstances(FindInstancesRequest),
    Register(Box<ServiceInfo>),
}

/// Dispatcher result.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CoreResponse {
    FindInstances(FindInstancesResponse),
    Registered(Box<ServiceInfo>),
}

/// Collaborators shared by the MP1 pipelines.
#[derive(Clone)]
pub struct Mp1Deps {
    pub registry: Arc<dyn InstanceStore>,
    pub index: Arc<LocalIndex>,
    pub resolver: Arc<EndpointResolver>,
    pub hook: Option<Arc<dyn ApiHook>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
