//! In-memory [`InstanceStore`] backed by [`DashMap`].

use std::cmp::Ordering;

use async_trait::async_trait;
use dashmap::DashMap;
use mep_core::{
    FindInstancesRequest, FindInstancesResponse, MicroService, MicroServiceInstance,
    RegistryStatus,
};
use tracing::debug;

use super::{InstanceStore, TargetScope};

/// Status code returned when no service matches a find request.
pub const ERR_SERVICE_NOT_EXISTS: i32 = 400_012;

/// Version rule selecting the highest registered version.
pub const VERSION_LATEST: &str = "latest";

struct ScopedService {
    scope: TargetScope,
    service: MicroService,
}

/// Registry kept entirely in process memory.
pub struct MemoryRegistry {
    services: DashMap<String, ScopedService>,
    instances: DashMap<String, MicroServiceInstance>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            instances: DashMap::new(),
        }
    }

    #[must_use]
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Numeric dotted-version ordering, falling back to text order.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let key = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    };
    key(a).cmp(&key(b)).then_with(|| a.cmp(b))
}

/// Service ids whose version satisfies `rule`.
fn select_versions(rule: &str, candidates: &[MicroService]) -> Vec<String> {
    let matching: Vec<&MicroService> = match rule {
        VERSION_LATEST => {
            let latest = candidates
                .iter()
                .map(|s| s.version.as_str())
                .max_by(|a, b| compare_versions(a, b));
            candidates
                .iter()
                .filter(|s| Some(s.version.as_str()) == latest)
                .collect()
        }
        "0+" | "0.0.0+" => candidates.iter().collect(),
        exact => candidates.iter().filter(|s| s.version == exact).collect(),
    };
    matching.into_iter().map(|s| s.service_id.clone()).collect()
}

#[async_trait]
impl InstanceStore for MemoryRegistry {
    async fn find(
        &self,
        scope: &TargetScope,
        request: &FindInstancesRequest,
    ) -> anyhow::Result<FindInstancesResponse> {
        let candidates: Vec<MicroService> = self
            .services
            .iter()
            .filter(|entry| {
                entry.scope == *scope
                    && entry.service.service_name == request.service_name
                    && entry.service.environment == request.environment
            })
            .map(|entry| entry.service.clone())
            .collect();

        if candidates.is_empty() {
            debug!(service = %request.service_name, "no such micro-service");
            return Ok(FindInstancesResponse {
                response: Some(RegistryStatus {
                    code: ERR_SERVICE_NOT_EXISTS,
                    message: "micro-service does not exist".to_string(),
                }),
                instances: Vec::new(),
            });
        }

        let service_ids = select_versions(&request.version_rule, &candidates);
        let mut instances: Vec<MicroServiceInstance> = self
            .instances
            .iter()
            .filter(|entry| service_ids.contains(&entry.service_id))
            .map(|entry| entry.value().clone())
            .collect();
        instances.sort_by_key(MicroServiceInstance::composite_id);

        Ok(FindInstancesResponse::with_instances(instances))
    }

    async fn register(
        &self,
        scope: &TargetScope,
        service: MicroService,
        instance: MicroServiceInstance,
    ) -> anyhow::Result<()> {
        anyhow::ensure!(!service.service_id.is_empty(), "service id is empty");
        anyhow::ensure!(
            instance.service_id == service.service_id,
            "instance {} does not belong to service {}",
            instance.instance_id,
            service.service_id
        );

        self.services.insert(
            service.service_id.clone(),
            ScopedService {
                scope: scope.clone(),
                service,
            },
        );
        self.instances.insert(instance.composite_id(), instance);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn service(id: &str, name: &str, version: &str) -> MicroService {
        MicroService {
            service_id: id.to_string(),
            service_name: name.to_string(),
            version: version.to_string(),
            status: "UP".to_string(),
            ..MicroService::default()
        }
    }

    fn instance(service_id: &str, instance_id: &str) -> MicroServiceInstance {
        MicroServiceInstance {
            service_id: service_id.to_string(),
            instance_id: instance_id.to_string(),
            status: "UP".to_string(),
            ..MicroServiceInstance::default()
        }
    }

    fn find_request(name: &str, rule: &str) -> FindInstancesRequest {
        FindInstancesRequest {
            service_name: name.to_string(),
            version_rule: rule.to_string(),
            ..FindInstancesRequest::default()
        }
    }

    async fn seeded() -> MemoryRegistry {
        let registry = MemoryRegistry::new();
        let scope = TargetScope::default();
        for (sid, version) in [("s1", "1.2.0"), ("s2", "1.10.0"), ("s3", "1.9.9")] {
            registry
                .register(&scope, service(sid, "location", version), instance(sid, "i1"))
                .await
                .unwrap();
        }
        registry
    }

    fn ids(rsp: &FindInstancesResponse) -> Vec<String> {
        rsp.instances.iter().map(MicroServiceInstance::composite_id).collect()
    }

    #[tokio::test]
    async fn latest_selects_highest_numeric_version() {
        let registry = seeded().await;
        let rsp = registry
            .find(&TargetScope::default(), &find_request("location", VERSION_LATEST))
            .await
            .unwrap();
        assert!(rsp.failure().is_none());
        assert_eq!(ids(&rsp), vec!["s2i1"]);
    }

    #[tokio::test]
    async fn open_range_and_exact_rules() {
        let registry = seeded().await;
        let scope = TargetScope::default();

        let all = registry.find(&scope, &find_request("location", "0+")).await.unwrap();
        assert_eq!(ids(&all), vec!["s1i1", "s2i1", "s3i1"]);

        let exact = registry.find(&scope, &find_request("location", "1.2.0")).await.unwrap();
        assert_eq!(ids(&exact), vec!["s1i1"]);

        let none = registry.find(&scope, &find_request("location", "9.9")).await.unwrap();
        assert!(none.failure().is_none());
        assert!(none.instances.is_empty());
    }

    #[tokio::test]
    async fn unknown_service_reports_status() {
        let registry = seeded().await;
        let rsp = registry
            .find(&TargetScope::default(), &find_request("weather", VERSION_LATEST))
            .await
            .unwrap();
        assert_eq!(rsp.failure().unwrap().code, ERR_SERVICE_NOT_EXISTS);
    }

    #[tokio::test]
    async fn scope_and_environment_isolate_services() {
        let registry = seeded().await;

        let other = TargetScope::new("tenant-b", "");
        let rsp = registry.find(&other, &find_request("location", "0+")).await.unwrap();
        assert!(rsp.failure().is_some());

        let mut req = find_request("location", "0+");
        req.environment = "production".to_string();
        let rsp = registry.find(&TargetScope::default(), &req).await.unwrap();
        assert!(rsp.failure().is_some());
    }

    #[tokio::test]
    async fn register_rejects_mismatched_instance() {
        let registry = MemoryRegistry::new();
        let err = registry
            .register(
                &TargetScope::default(),
                service("s1", "location", "1.0"),
                instance("s2", "i1"),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not belong"));
        assert_eq!(registry.instance_count(), 0);
    }

    #[test]
    fn version_ordering_is_numeric() {
        assert_eq!(compare_versions("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("2", "10"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0"), Ordering::Equal);
    }
}
