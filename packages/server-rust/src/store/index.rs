//! Local instance index serving "all services" discovery.
//!
//! Entries are keyed by composite instance id and replaced whole, so a
//! reader never observes a half-written instance.

use dashmap::DashMap;
use mep_core::properties::{keys, parse_bool};
use mep_core::{FindInstancesResponse, MicroServiceInstance};

use crate::mp1::QueryParams;

/// MP1 query parameters understood by the index.
pub mod params {
    pub const SER_INSTANCE_ID: &str = "ser_instance_id";
    pub const SER_CATEGORY_ID: &str = "ser_category_id";
    pub const SCOPE_OF_LOCALITY: &str = "scope_of_locality";
    pub const CONSUMED_LOCAL_ONLY: &str = "consumed_local_only";
    pub const IS_LOCAL: &str = "is_local";
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("query parameter {param} is not a boolean: {value:?}")]
    InvalidBool { param: &'static str, value: String },
}

/// Parsed filter; `None` fields match anything.
struct IndexFilter<'q> {
    instance_ids: Option<Vec<&'q str>>,
    category_id: Option<&'q str>,
    locality: Option<&'q str>,
    consumed_local_only: Option<bool>,
    is_local: Option<bool>,
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

fn bool_param(query: &QueryParams, param: &'static str) -> Result<Option<bool>, IndexError> {
    let Some(raw) = non_empty(query.get(param)) else {
        return Ok(None);
    };
    parse_bool(raw)
        .map(Some)
        .ok_or_else(|| IndexError::InvalidBool {
            param,
            value: raw.to_string(),
        })
}

impl<'q> IndexFilter<'q> {
    fn from_query(query: &'q QueryParams) -> Result<Self, IndexError> {
        Ok(Self {
            instance_ids: non_empty(query.get(params::SER_INSTANCE_ID)).map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .collect()
            }),
            category_id: non_empty(query.get(params::SER_CATEGORY_ID)),
            locality: non_empty(query.get(params::SCOPE_OF_LOCALITY)),
            consumed_local_only: bool_param(query, params::CONSUMED_LOCAL_ONLY)?,
            is_local: bool_param(query, params::IS_LOCAL)?,
        })
    }

    fn matches(&self, id: &str, instance: &MicroServiceInstance) -> bool {
        let property = |key: &str| instance.properties.get(key).map_or("", String::as_str);
        let flag = |key: &str| parse_bool(property(key)).unwrap_or(false);

        self.instance_ids.as_ref().is_none_or(|ids| ids.contains(&id))
            && self.category_id.is_none_or(|c| property(keys::SER_CATEGORY_ID) == c)
            && self.locality.is_none_or(|l| property(keys::SCOPE_OF_LOCALITY) == l)
            && self
                .consumed_local_only
                .is_none_or(|want| flag(keys::CONSUMED_LOCAL_ONLY) == want)
            && self.is_local.is_none_or(|want| flag(keys::IS_LOCAL) == want)
    }
}

/// Concurrent map of registered instances.
pub struct LocalIndex {
    entries: DashMap<String, MicroServiceInstance>,
}

impl LocalIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Inserts or replaces `instance`, returning the previous entry.
    pub fn upsert(&self, instance: MicroServiceInstance) -> Option<MicroServiceInstance> {
        self.entries.insert(instance.composite_id(), instance)
    }

    pub fn remove(&self, composite_id: &str) -> Option<MicroServiceInstance> {
        self.entries.remove(composite_id).map(|(_, inst)| inst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Instances matching the MP1 query filters, ordered by composite id.
    /// Returns `Ok(None)` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidBool`] for a malformed boolean filter.
    pub fn find_instance_by_key(
        &self,
        query: &QueryParams,
    ) -> Result<Option<FindInstancesResponse>, IndexError> {
        let filter = IndexFilter::from_query(query)?;
        let mut instances: Vec<MicroServiceInstance> = self
            .entries
            .iter()
            .filter(|entry| filter.matches(entry.key(), entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        if instances.is_empty() {
            return Ok(None);
        }
        instances.sort_by_key(MicroServiceInstance::composite_id);
        Ok(Some(FindInstancesResponse::with_instances(instances)))
    }
}

impl Default for LocalIndex {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use mep_core::registry::bag;

    use super::*;

    fn instance(service_id: &str, instance_id: &str, props: &[(&str, &str)]) -> MicroServiceInstance {
        MicroServiceInstance {
            service_id: service_id.to_string(),
            instance_id: instance_id.to_string(),
            properties: props
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..MicroServiceInstance::default()
        }
    }

    fn index() -> LocalIndex {
        let index = LocalIndex::new();
        index.upsert(instance(
            "abc",
            "123",
            &[(keys::SER_CATEGORY_ID, "cat-1"), (keys::IS_LOCAL, "true")],
        ));
        index.upsert(instance(
            "xyz",
            "789",
            &[(keys::SER_CATEGORY_ID, "cat-2"), (keys::SCOPE_OF_LOCALITY, "MEC_HOST")],
        ));
        index
    }

    fn found(index: &LocalIndex, query: &QueryParams) -> Vec<String> {
        index
            .find_instance_by_key(query)
            .unwrap()
            .map(|rsp| rsp.instances.iter().map(MicroServiceInstance::composite_id).collect())
            .unwrap_or_default()
    }

    #[test]
    fn empty_query_returns_everything_in_order() {
        assert_eq!(found(&index(), &QueryParams::default()), vec!["abc123", "xyz789"]);
    }

    #[test]
    fn empty_index_yields_none() {
        let empty = LocalIndex::new();
        assert!(empty.find_instance_by_key(&QueryParams::default()).unwrap().is_none());
    }

    #[test]
    fn filters_by_instance_ids_and_properties() {
        let index = index();
        let q: QueryParams = [(params::SER_INSTANCE_ID, "xyz789, nope")].into_iter().collect();
        assert_eq!(found(&index, &q), vec!["xyz789"]);

        let q: QueryParams = [(params::SER_CATEGORY_ID, "cat-1")].into_iter().collect();
        assert_eq!(found(&index, &q), vec!["abc123"]);

        let q: QueryParams = [(params::SCOPE_OF_LOCALITY, "MEC_HOST")].into_iter().collect();
        assert_eq!(found(&index, &q), vec!["xyz789"]);

        let q: QueryParams = [(params::IS_LOCAL, "false")].into_iter().collect();
        assert_eq!(found(&index, &q), vec!["xyz789"]);

        let q: QueryParams = [(params::CONSUMED_LOCAL_ONLY, "true")].into_iter().collect();
        assert!(index.find_instance_by_key(&q).unwrap().is_none());
    }

    #[test]
    fn malformed_boolean_is_an_error() {
        let q: QueryParams = [(params::IS_LOCAL, "sometimes")].into_iter().collect();
        assert_eq!(
            index().find_instance_by_key(&q).unwrap_err(),
            IndexError::InvalidBool {
                param: params::IS_LOCAL,
                value: "sometimes".to_string()
            }
        );
    }

    #[test]
    fn upsert_replaces_and_remove_deletes() {
        let index = index();
        let previous = index.upsert(instance("abc", "123", &[]));
        assert!(previous.is_some());
        assert_eq!(index.len(), 2);

        let bag_after = index.remove("abc123").unwrap().properties;
        assert_eq!(bag_after, bag([]));
        assert_eq!(index.len(), 1);
        assert!(index.remove("abc123").is_none());
    }
}
