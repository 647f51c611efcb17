//! Registry store boundary and the in-process local index.

pub mod index;
pub mod memory;

use async_trait::async_trait;
use mep_core::{FindInstancesRequest, FindInstancesResponse, MicroService, MicroServiceInstance};

pub use index::{IndexError, LocalIndex};
pub use memory::MemoryRegistry;

use crate::mp1::DEFAULT_SCOPE;

/// Tenant scope a registry call runs under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetScope {
    pub domain: String,
    pub project: String,
}

impl TargetScope {
    /// Scope from raw values; empty parts fall back to `"default"`.
    #[must_use]
    pub fn new(domain: &str, project: &str) -> Self {
        let or_default = |v: &str| {
            if v.is_empty() {
                DEFAULT_SCOPE.to_string()
            } else {
                v.to_string()
            }
        };
        Self {
            domain: or_default(domain),
            project: or_default(project),
        }
    }
}

impl Default for TargetScope {
    fn default() -> Self {
        Self::new("", "")
    }
}

/// Service registry holding services and their instances.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Finds instances of the requested service.
    ///
    /// A missing service is reported through the response status, not as an
    /// `Err`; `Err` means the registry itself could not be queried.
    async fn find(
        &self,
        scope: &TargetScope,
        request: &FindInstancesRequest,
    ) -> anyhow::Result<FindInstancesResponse>;

    /// Stores a service record and one of its instances.
    async fn register(
        &self,
        scope: &TargetScope,
        service: MicroService,
        instance: MicroServiceInstance,
    ) -> anyhow::Result<()>;
}
