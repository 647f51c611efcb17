//! Registry-native records.
//!
//! The service registry stores services and instances in its own shape:
//! a flat property bag per instance plus a handful of typed columns. These
//! types are what the registry store boundary consumes and returns.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::properties::PropertyBag;

/// Registry service record (one per service name/version).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroService {
    pub service_id: String,
    pub app_id: String,
    pub service_name: String,
    pub version: String,
    pub environment: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckMode {
    #[default]
    Push,
    Pull,
}

/// Health check record attached to every instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub mode: HealthCheckMode,
    pub port: i32,
    pub interval: i32,
    pub times: i32,
    pub url: String,
}

impl HealthCheck {
    /// Heartbeat-driven check with an effectively unbounded interval.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self {
            mode: HealthCheckMode::Push,
            port: 0,
            interval: i32::MAX - 1,
            times: 0,
            url: String::new(),
        }
    }
}

/// Registry instance record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroServiceInstance {
    pub instance_id: String,
    pub service_id: String,
    pub version: String,
    pub host_name: String,
    pub endpoints: Vec<String>,
    pub status: String,
    pub properties: PropertyBag,
    pub health_check: Option<HealthCheck>,
    /// Unix seconds, decimal.
    pub timestamp: String,
    pub mod_timestamp: String,
}

impl MicroServiceInstance {
    /// Id exposed to MP1 clients as `serInstanceId`.
    #[must_use]
    pub fn composite_id(&self) -> String {
        format!("{}{}", self.service_id, self.instance_id)
    }
}

/// Find request understood by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindInstancesRequest {
    pub consumer_service_id: String,
    pub app_id: String,
    pub service_name: String,
    pub version_rule: String,
    pub environment: String,
    pub tags: Vec<String>,
}

/// Result status carried in registry responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatus {
    pub code: i32,
    pub message: String,
}

impl RegistryStatus {
    pub const SUCCESS: i32 = 0;

    #[must_use]
    pub fn success() -> Self {
        Self {
            code: Self::SUCCESS,
            message: "success".to_string(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == Self::SUCCESS
    }
}

/// Find response from the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindInstancesResponse {
    pub response: Option<RegistryStatus>,
    pub instances: Vec<MicroServiceInstance>,
}

impl FindInstancesResponse {
    /// Successful response wrapping the given instances.
    #[must_use]
    pub fn with_instances(instances: Vec<MicroServiceInstance>) -> Self {
        Self {
            response: Some(RegistryStatus::success()),
            instances,
        }
    }

    /// Non-success status to forward to the caller, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&RegistryStatus> {
        self.response.as_ref().filter(|r| !r.is_success())
    }
}

/// Builds a property bag from literal pairs. Test and fixture helper.
#[must_use]
pub fn bag<const N: usize>(pairs: [(&str, &str); N]) -> PropertyBag {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<HashMap<_, _>>()
}
