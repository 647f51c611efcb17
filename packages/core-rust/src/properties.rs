//! Property-bag codec.
//!
//! Flattens a [`ServiceInfo`] into the string-keyed property map the
//! registry stores per instance, and rebuilds it on the way back. Decoding
//! is tolerant: malformed scalars are logged and left at their zero value.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::endpoint::{split_host_port, EndpointKind, ResolvedEndpoints};
use crate::registry::{HealthCheck, MicroService, MicroServiceInstance};
use crate::types::{
    EndPointAddress, LocalityType, SerializerType, ServiceInfo, ServiceState, TransportType,
};

/// Flat per-instance property map owned by the registry.
pub type PropertyBag = HashMap<String, String>;

/// Liveness interval written for every service that asks for heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: u32 = 60;

/// Host name recorded on every encoded instance.
pub const DEFAULT_HOST_NAME: &str = "default";

/// Property keys.
pub mod keys {
    pub const SER_NAME: &str = "serName";
    pub const TRANSPORT_ID: &str = "transportId";
    pub const SERIALIZER: &str = "serializer";
    pub const SCOPE_OF_LOCALITY: &str = "ScopeOfLocality";
    pub const CONSUMED_LOCAL_ONLY: &str = "ConsumedLocalOnly";
    pub const IS_LOCAL: &str = "IsLocal";
    pub const LIVENESS_INTERVAL: &str = "livenessInterval";
    pub const LIVENESS: &str = "liveness";
    pub const MEC_STATE: &str = "mecState";
    pub const END_POINT_TYPE: &str = "endPointType";
    pub const APP_INSTANCE_ID: &str = "appInstanceId";
    pub const TIMESTAMP_SECONDS: &str = "timestamp/seconds";
    pub const TIMESTAMP_NANOSECONDS: &str = "timestamp/nanoseconds";

    pub const TRANSPORT_INFO_ID: &str = "transportInfo/id";
    pub const TRANSPORT_INFO_NAME: &str = "transportInfo/name";
    pub const TRANSPORT_INFO_DESCRIPTION: &str = "transportInfo/description";
    pub const TRANSPORT_INFO_TYPE: &str = "transportInfo/type";
    pub const TRANSPORT_INFO_PROTOCOL: &str = "transportInfo/protocol";
    pub const TRANSPORT_INFO_VERSION: &str = "transportInfo/version";
    pub const GRANT_TYPES: &str = "transportInfo/security/oAuth2Info/grantTypes";
    pub const TOKEN_ENDPOINT: &str = "transportInfo/security/oAuth2Info/tokenEndpoint";

    pub const SER_CATEGORY_HREF: &str = "serCategory/href";
    pub const SER_CATEGORY_ID: &str = "serCategory/id";
    pub const SER_CATEGORY_NAME: &str = "serCategory/name";
    pub const SER_CATEGORY_VERSION: &str = "serCategory/version";
}

/// Separator for multi-valued properties.
const LIST_SEPARATOR: &str = ",";

/// Inserts `value` under `key` unless it is empty.
fn put(bag: &mut PropertyBag, key: &str, value: &str) {
    if !value.is_empty() {
        bag.insert(key.to_string(), value.to_string());
    }
}

fn get<'a>(bag: &'a PropertyBag, key: &str) -> &'a str {
    bag.get(key).map_or("", String::as_str)
}

/// Splits a decimal nanosecond timestamp into its `seconds` and
/// `nanoseconds` halves at `len / 2 + 1`. For present-day 19-digit values
/// this lands on the real seconds/nanoseconds boundary.
#[must_use]
pub fn split_timestamp(nanos: &str) -> (&str, &str) {
    let mid = (nanos.len() / 2 + 1).min(nanos.len());
    nanos.split_at(mid)
}

/// Registry service record for `info`.
#[must_use]
pub fn to_micro_service(info: &ServiceInfo) -> MicroService {
    MicroService {
        service_id: String::new(),
        app_id: String::new(),
        service_name: info.ser_name.clone(),
        version: info.version.clone(),
        environment: String::new(),
        status: info.state.registry_status().to_string(),
    }
}

/// Encodes `info` into a registry instance using already-resolved endpoints.
///
/// A non-zero liveness interval is replaced by [`DEFAULT_HEARTBEAT_INTERVAL`]
/// both in the bag and on `info`. Service and instance ids are left empty
/// for the registering side to fill in.
#[must_use]
pub fn encode_instance(
    info: &mut ServiceInfo,
    resolved: ResolvedEndpoints,
    now: SystemTime,
) -> MicroServiceInstance {
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let mut bag = PropertyBag::with_capacity(24);

    put(&mut bag, keys::SER_NAME, &info.ser_name);
    put(&mut bag, keys::SER_CATEGORY_HREF, &info.ser_category.href);
    put(&mut bag, keys::SER_CATEGORY_ID, &info.ser_category.id);
    put(&mut bag, keys::SER_CATEGORY_NAME, &info.ser_category.name);
    put(&mut bag, keys::SER_CATEGORY_VERSION, &info.ser_category.version);

    put(&mut bag, keys::TRANSPORT_ID, &info.transport_id);
    put(&mut bag, keys::SERIALIZER, info.serializer.map_or("", SerializerType::as_str));
    put(
        &mut bag,
        keys::SCOPE_OF_LOCALITY,
        info.scope_of_locality.map_or("", LocalityType::as_str),
    );
    put(&mut bag, keys::CONSUMED_LOCAL_ONLY, bool_str(info.consumed_local_only));
    put(&mut bag, keys::IS_LOCAL, bool_str(info.is_local));

    if info.liveness_interval == 0 {
        put(&mut bag, keys::LIVENESS_INTERVAL, "0");
    } else {
        info.liveness_interval = DEFAULT_HEARTBEAT_INTERVAL;
        put(&mut bag, keys::LIVENESS_INTERVAL, &DEFAULT_HEARTBEAT_INTERVAL.to_string());
        put(&mut bag, keys::LIVENESS, &info.links.self_link.liveness);
    }
    put(&mut bag, keys::MEC_STATE, info.state.as_str());

    let nanos = since_epoch.as_nanos().to_string();
    let (seconds, nanoseconds) = split_timestamp(&nanos);
    put(&mut bag, keys::TIMESTAMP_SECONDS, seconds);
    put(&mut bag, keys::TIMESTAMP_NANOSECONDS, nanoseconds);

    bag.insert(keys::END_POINT_TYPE.to_string(), resolved.kind_str().to_string());

    let transport = &info.transport_info;
    put(&mut bag, keys::TRANSPORT_INFO_ID, &transport.id);
    put(&mut bag, keys::TRANSPORT_INFO_NAME, &transport.name);
    put(&mut bag, keys::TRANSPORT_INFO_DESCRIPTION, &transport.description);
    put(
        &mut bag,
        keys::TRANSPORT_INFO_TYPE,
        transport.trans_type.map_or("", TransportType::as_str),
    );
    put(&mut bag, keys::TRANSPORT_INFO_PROTOCOL, &transport.protocol);
    put(&mut bag, keys::TRANSPORT_INFO_VERSION, &transport.version);
    let oauth = &transport.security.oauth2_info;
    put(&mut bag, keys::GRANT_TYPES, &oauth.grant_types.join(LIST_SEPARATOR));
    put(&mut bag, keys::TOKEN_ENDPOINT, &oauth.token_endpoint);

    let timestamp = since_epoch.as_secs().to_string();
    MicroServiceInstance {
        instance_id: String::new(),
        service_id: String::new(),
        version: info.version.clone(),
        host_name: DEFAULT_HOST_NAME.to_string(),
        endpoints: resolved.endpoints,
        status: info.state.registry_status().to_string(),
        properties: bag,
        health_check: Some(HealthCheck::heartbeat()),
        mod_timestamp: timestamp.clone(),
        timestamp,
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Accepts the usual boolean spellings (`1`, `t`, `TRUE`, `false`, ...).
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn decode_bool(bag: &PropertyBag, key: &str) -> bool {
    match bag.get(key) {
        None => false,
        Some(raw) => parse_bool(raw).unwrap_or_else(|| {
            warn!(property = key, value = %raw, "parse bool property failed");
            false
        }),
    }
}

fn decode_enum<T>(bag: &PropertyBag, key: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
    let raw = bag.get(key)?;
    let parsed = parse(raw);
    if parsed.is_none() {
        warn!(property = key, value = %raw, "unknown enum property value");
    }
    parsed
}

/// Rebuilds a [`ServiceInfo`] from a registry instance.
#[must_use]
pub fn decode_instance(inst: &MicroServiceInstance) -> ServiceInfo {
    let bag = &inst.properties;
    let mut info = ServiceInfo {
        ser_instance_id: inst.composite_id(),
        ser_name: get(bag, keys::SER_NAME).to_string(),
        version: inst.version.clone(),
        transport_id: get(bag, keys::TRANSPORT_ID).to_string(),
        serializer: decode_enum(bag, keys::SERIALIZER, SerializerType::parse),
        scope_of_locality: decode_enum(bag, keys::SCOPE_OF_LOCALITY, LocalityType::parse),
        consumed_local_only: decode_bool(bag, keys::CONSUMED_LOCAL_ONLY),
        is_local: decode_bool(bag, keys::IS_LOCAL),
        ..ServiceInfo::default()
    };

    info.ser_category.href = get(bag, keys::SER_CATEGORY_HREF).to_string();
    info.ser_category.id = get(bag, keys::SER_CATEGORY_ID).to_string();
    info.ser_category.name = get(bag, keys::SER_CATEGORY_NAME).to_string();
    info.ser_category.version = get(bag, keys::SER_CATEGORY_VERSION).to_string();

    info.state = ServiceState::parse(get(bag, keys::MEC_STATE))
        .or_else(|| ServiceState::from_registry_status(&inst.status))
        .unwrap_or_else(|| {
            warn!(status = %inst.status, "instance carries no recognizable state");
            ServiceState::default()
        });

    if let Some(raw) = bag.get(keys::LIVENESS_INTERVAL) {
        info.liveness_interval = raw.parse().unwrap_or_else(|_| {
            warn!(value = %raw, "parse int liveness interval failed");
            0
        });
    }
    if info.liveness_interval != 0 {
        info.links.self_link.liveness = get(bag, keys::LIVENESS).to_string();
    }

    decode_endpoints(&mut info, &inst.endpoints, get(bag, keys::END_POINT_TYPE));

    let transport = &mut info.transport_info;
    transport.id = get(bag, keys::TRANSPORT_INFO_ID).to_string();
    transport.name = get(bag, keys::TRANSPORT_INFO_NAME).to_string();
    transport.description = get(bag, keys::TRANSPORT_INFO_DESCRIPTION).to_string();
    transport.trans_type = decode_enum(bag, keys::TRANSPORT_INFO_TYPE, TransportType::parse);
    transport.protocol = get(bag, keys::TRANSPORT_INFO_PROTOCOL).to_string();
    transport.version = get(bag, keys::TRANSPORT_INFO_VERSION).to_string();
    let grant_types = get(bag, keys::GRANT_TYPES);
    transport.security.oauth2_info.grant_types = if grant_types.is_empty() {
        Vec::new()
    } else {
        grant_types.split(LIST_SEPARATOR).map(str::to_string).collect()
    };
    transport.security.oauth2_info.token_endpoint = get(bag, keys::TOKEN_ENDPOINT).to_string();

    info
}

fn decode_endpoints(info: &mut ServiceInfo, endpoints: &[String], kind: &str) {
    let target = &mut info.transport_info.endpoint;
    match EndpointKind::parse(kind) {
        Some(EndpointKind::Uris) => target.uris = endpoints.to_vec(),
        Some(EndpointKind::Addresses) => {
            target.addresses = endpoints
                .iter()
                .map(|ep| {
                    let (host, port) = split_host_port(ep);
                    EndPointAddress { host, port }
                })
                .collect();
        }
        Some(EndpointKind::Alternative) => {
            let Some(first) = endpoints.first() else {
                return;
            };
            match serde_json::from_str(first) {
                Ok(value) => target.alternative = Some(value),
                Err(e) => warn!(error = %e, "parse alternative endpoint failed"),
            }
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::endpoint::{plan_endpoints, DEFAULT_GATEWAY_AUTHORITY};
    use crate::registry::bag;
    use crate::types::{CategoryRef, EndPointInfo, TransportInfo};

    fn sample() -> ServiceInfo {
        let mut info = ServiceInfo {
            ser_name: "location".to_string(),
            ser_category: CategoryRef {
                href: "/cat/1".to_string(),
                id: "1".to_string(),
                name: "loc".to_string(),
                version: "v1".to_string(),
            },
            version: "1.0.0".to_string(),
            state: ServiceState::Inactive,
            transport_id: "rest-1".to_string(),
            serializer: Some(SerializerType::Json),
            scope_of_locality: Some(LocalityType::MecHost),
            consumed_local_only: true,
            is_local: false,
            liveness_interval: 5,
            ..ServiceInfo::default()
        };
        info.links.self_link.liveness = "/liveness".to_string();
        info.transport_info = TransportInfo {
            id: "t1".to_string(),
            name: "rest".to_string(),
            description: "rest api".to_string(),
            trans_type: Some(TransportType::RestHttp),
            protocol: "HTTP".to_string(),
            version: "2.0".to_string(),
            endpoint: EndPointInfo {
                uris: vec!["http://10.0.0.5:8080/loc".to_string()],
                ..EndPointInfo::default()
            },
            ..TransportInfo::default()
        };
        info.transport_info.security.oauth2_info.grant_types =
            vec!["OAUTH2_CLIENT_CREDENTIALS".to_string(), "OAUTH2_IMPLICIT_GRANT".to_string()];
        info.transport_info.security.oauth2_info.token_endpoint = "/token".to_string();
        info
    }

    fn encode(info: &mut ServiceInfo) -> MicroServiceInstance {
        let plan = plan_endpoints(info, DEFAULT_GATEWAY_AUTHORITY, "unused");
        let mut inst = encode_instance(info, plan.resolved, SystemTime::now());
        inst.service_id = "svc".to_string();
        inst.instance_id = "inst".to_string();
        inst
    }

    #[test]
    fn round_trip_reproduces_fields() {
        let original = sample();
        let mut encoded_from = original.clone();
        let inst = encode(&mut encoded_from);
        let decoded = decode_instance(&inst);

        let expected = ServiceInfo {
            ser_instance_id: "svcinst".to_string(),
            liveness_interval: DEFAULT_HEARTBEAT_INTERVAL,
            ..original
        };
        assert_eq!(decoded, expected);
    }

    #[test]
    fn encode_forces_default_liveness_interval() {
        let mut info = sample();
        info.liveness_interval = 900;
        let inst = encode(&mut info);
        assert_eq!(info.liveness_interval, DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(inst.properties[keys::LIVENESS_INTERVAL], "60");

        let mut info = sample();
        info.liveness_interval = 0;
        let inst = encode(&mut info);
        assert_eq!(info.liveness_interval, 0);
        assert_eq!(inst.properties[keys::LIVENESS_INTERVAL], "0");
        assert!(!inst.properties.contains_key(keys::LIVENESS));
    }

    #[test]
    fn encode_sets_registry_columns() {
        let mut info = sample();
        let inst = encode(&mut info);
        assert_eq!(inst.status, "DOWN");
        assert_eq!(inst.host_name, DEFAULT_HOST_NAME);
        assert_eq!(inst.version, "1.0.0");
        assert_eq!(inst.health_check, Some(HealthCheck::heartbeat()));
        assert_eq!(inst.timestamp, inst.mod_timestamp);
        assert_eq!(inst.properties[keys::END_POINT_TYPE], "uris");
        assert_eq!(inst.properties[keys::MEC_STATE], "INACTIVE");
    }

    #[test]
    fn empty_values_are_not_written() {
        let mut info = ServiceInfo {
            ser_name: "bare".to_string(),
            version: "1".to_string(),
            ..ServiceInfo::default()
        };
        let inst = encode(&mut info);
        assert!(!inst.properties.contains_key(keys::TRANSPORT_ID));
        assert!(!inst.properties.contains_key(keys::SER_CATEGORY_HREF));
        assert!(!inst.properties.contains_key(keys::GRANT_TYPES));
        assert_eq!(inst.properties[keys::CONSUMED_LOCAL_ONLY], "false");
        assert_eq!(inst.properties[keys::END_POINT_TYPE], "");
    }

    #[test]
    fn timestamp_is_bisected_by_length() {
        assert_eq!(split_timestamp("1700000000123456789"), ("1700000000", "123456789"));
        assert_eq!(split_timestamp("12345"), ("123", "45"));
        assert_eq!(split_timestamp("1"), ("1", ""));
        assert_eq!(split_timestamp(""), ("", ""));

        let mut info = sample();
        let now = UNIX_EPOCH + Duration::new(1_700_000_000, 5);
        let inst = encode_instance(&mut info, ResolvedEndpoints::default(), now);
        assert_eq!(inst.properties[keys::TIMESTAMP_SECONDS], "1700000000");
        assert_eq!(inst.properties[keys::TIMESTAMP_NANOSECONDS], "000000005");
        assert_eq!(inst.timestamp, "1700000000");
    }

    #[test]
    fn malformed_scalars_decode_to_zero_values() {
        let inst = MicroServiceInstance {
            status: "UP".to_string(),
            properties: bag([
                (keys::LIVENESS_INTERVAL, "soon"),
                (keys::LIVENESS, "/ignored"),
                (keys::CONSUMED_LOCAL_ONLY, "maybe"),
                (keys::IS_LOCAL, "T"),
                (keys::SERIALIZER, "YAML"),
            ]),
            ..MicroServiceInstance::default()
        };
        let info = decode_instance(&inst);
        assert_eq!(info.liveness_interval, 0);
        assert!(info.links.is_empty());
        assert!(!info.consumed_local_only);
        assert!(info.is_local);
        assert_eq!(info.serializer, None);
        assert_eq!(info.state, ServiceState::Active);
    }

    #[test]
    fn state_falls_back_to_registry_status() {
        let inst = MicroServiceInstance {
            status: "DOWN".to_string(),
            ..MicroServiceInstance::default()
        };
        assert_eq!(decode_instance(&inst).state, ServiceState::Inactive);
    }

    #[test]
    fn address_endpoints_decode_host_and_port() {
        let inst = MicroServiceInstance {
            status: "UP".to_string(),
            endpoints: vec!["10.0.0.5:8080".to_string(), "10.0.0.6:9090".to_string()],
            properties: bag([(keys::END_POINT_TYPE, "addresses")]),
            ..MicroServiceInstance::default()
        };
        let info = decode_instance(&inst);
        let addresses = info.transport_info.endpoint.addresses;
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[1].host, "10.0.0.6");
        assert_eq!(addresses[1].port, 9090);
    }

    #[test]
    fn alternative_endpoint_round_trips() {
        let mut info = sample();
        info.transport_info.endpoint = EndPointInfo {
            alternative: Some(json!({"topics": ["a", "b"], "qos": 1})),
            ..EndPointInfo::default()
        };
        let inst = encode(&mut info);
        assert_eq!(inst.properties[keys::END_POINT_TYPE], "alternative");
        let decoded = decode_instance(&inst);
        assert_eq!(decoded.transport_info.endpoint, info.transport_info.endpoint);
    }

    #[test]
    fn micro_service_uses_registry_status() {
        let svc = to_micro_service(&sample());
        assert_eq!(svc.status, "DOWN");
        assert_eq!(svc.service_name, "location");
        assert!(svc.app_id.is_empty());
    }

    fn token() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_./-]{0,12}"
    }

    prop_compose! {
        fn arb_service()(
            (ser_name, version) in ("[A-Za-z][A-Za-z0-9_-]{0,15}", "[0-9]{1,2}\\.[0-9]{1,2}"),
            inactive in any::<bool>(),
            transport_id in token(),
            serializer in proptest::option::of(prop_oneof![
                Just(SerializerType::Json),
                Just(SerializerType::Xml),
                Just(SerializerType::Protobuf3),
            ]),
            scope in proptest::option::of(proptest::sample::select(LocalityType::ALL.to_vec())),
            trans_type in proptest::option::of(proptest::sample::select(TransportType::ALL.to_vec())),
            (consumed_local_only, is_local) in (any::<bool>(), any::<bool>()),
            liveness in 1u32..=2_147_483_646,
            href in "/[a-z]{1,8}",
            category in (token(), token(), token(), token()),
            transport in (token(), token(), token(), token(), token()),
            (uris, grant_types, token_endpoint) in (
                proptest::collection::vec("http://[a-z]{1,8}:[0-9]{2,4}/", 0..3),
                proptest::collection::vec("[A-Z_]{1,10}", 0..3),
                token(),
            ),
        ) -> ServiceInfo {
            let mut info = ServiceInfo {
                ser_name,
                version,
                state: if inactive { ServiceState::Inactive } else { ServiceState::Active },
                transport_id,
                serializer,
                scope_of_locality: scope,
                consumed_local_only,
                is_local,
                liveness_interval: liveness,
                ..ServiceInfo::default()
            };
            info.links.self_link.liveness = href;
            info.ser_category = CategoryRef {
                href: category.0,
                id: category.1,
                name: category.2,
                version: category.3,
            };
            info.transport_info = TransportInfo {
                id: transport.0,
                name: transport.1,
                description: transport.2,
                trans_type,
                protocol: transport.3,
                version: transport.4,
                endpoint: EndPointInfo { uris, ..EndPointInfo::default() },
                ..TransportInfo::default()
            };
            info.transport_info.security.oauth2_info.grant_types = grant_types;
            info.transport_info.security.oauth2_info.token_endpoint = token_endpoint;
            info
        }
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(original in arb_service()) {
            let mut working = original.clone();
            let inst = encode(&mut working);
            let decoded = decode_instance(&inst);
            let expected = ServiceInfo {
                ser_instance_id: "svcinst".to_string(),
                liveness_interval: DEFAULT_HEARTBEAT_INTERVAL,
                ..original
            };
            prop_assert_eq!(decoded, expected);
        }
    }
}
