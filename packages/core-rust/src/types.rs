//! MP1 service description records.
//!
//! These types mirror the JSON shape of the `ServiceInfo` resource exchanged
//! on the MP1 service-management API. They are never stored directly: the
//! registry only sees the flattened property bag produced by
//! [`crate::properties`].

use serde::{Deserialize, Serialize};

/// A registered MEC service as seen by MP1 clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    /// Server-assigned composite id (`service_id + instance_id`). Empty until registered.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ser_instance_id: String,
    pub ser_name: String,
    #[serde(default)]
    pub ser_category: CategoryRef,
    pub version: String,
    pub state: ServiceState,
    #[serde(default)]
    pub transport_id: String,
    #[serde(default)]
    pub transport_info: TransportInfo,
    #[serde(default, with = "empty_as_none")]
    pub serializer: Option<SerializerType>,
    #[serde(default, with = "empty_as_none")]
    pub scope_of_locality: Option<LocalityType>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub consumed_local_only: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_local: bool,
    #[serde(default)]
    pub liveness_interval: u32,
    #[serde(default, rename = "_links", skip_serializing_if = "Link::is_empty")]
    pub links: Link,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

/// Unset enum fields travel as `""` in both directions.
mod empty_as_none {
    use serde::de::{DeserializeOwned, IntoDeserializer};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(value: &Option<T>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => v.serialize(s),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, T: DeserializeOwned, D: Deserializer<'de>>(d: D) -> Result<Option<T>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) if !raw.is_empty() => {
                T::deserialize(IntoDeserializer::<D::Error>::into_deserializer(raw)).map(Some)
            }
            _ => Ok(None),
        }
    }
}

/// Reference to the category a service belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    #[default]
    Active,
    Inactive,
}

impl ServiceState {
    /// MP1 spelling stored under the `mecState` property.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }

    /// Parses the MP1 spelling.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(Self::Active),
            "INACTIVE" => Some(Self::Inactive),
            _ => None,
        }
    }

    /// Registry status string for this state.
    #[must_use]
    pub fn registry_status(self) -> &'static str {
        match self {
            Self::Active => "UP",
            Self::Inactive => "DOWN",
        }
    }

    /// Inverse of [`ServiceState::registry_status`].
    #[must_use]
    pub fn from_registry_status(status: &str) -> Option<Self> {
        match status {
            "UP" => Some(Self::Active),
            "DOWN" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// Wire serializer advertised by a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SerializerType {
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "XML")]
    Xml,
    #[serde(rename = "PROTOBUF3")]
    Protobuf3,
}

impl SerializerType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Xml => "XML",
            Self::Protobuf3 => "PROTOBUF3",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "JSON" => Some(Self::Json),
            "XML" => Some(Self::Xml),
            "PROTOBUF3" => Some(Self::Protobuf3),
            _ => None,
        }
    }
}

/// Scope within which a service may be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalityType {
    MecSystem,
    MecHost,
    NfviPop,
    Zone,
    ZoneGroup,
    NfviNode,
}

impl LocalityType {
    pub const ALL: [Self; 6] = [
        Self::MecSystem,
        Self::MecHost,
        Self::NfviPop,
        Self::Zone,
        Self::ZoneGroup,
        Self::NfviNode,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MecSystem => "MEC_SYSTEM",
            Self::MecHost => "MEC_HOST",
            Self::NfviPop => "NFVI_POP",
            Self::Zone => "ZONE",
            Self::ZoneGroup => "ZONE_GROUP",
            Self::NfviNode => "NFVI_NODE",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == value)
    }
}

/// Transport binding a service is reachable over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportType {
    RestHttp,
    MbTopicBased,
    MbRouting,
    MbPubsub,
    Rpc,
    RpcStreaming,
    Websocket,
}

impl TransportType {
    pub const ALL: [Self; 7] = [
        Self::RestHttp,
        Self::MbTopicBased,
        Self::MbRouting,
        Self::MbPubsub,
        Self::Rpc,
        Self::RpcStreaming,
        Self::Websocket,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RestHttp => "REST_HTTP",
            Self::MbTopicBased => "MB_TOPIC_BASED",
            Self::MbRouting => "MB_ROUTING",
            Self::MbPubsub => "MB_PUBSUB",
            Self::Rpc => "RPC",
            Self::RpcStreaming => "RPC_STREAMING",
            Self::Websocket => "WEBSOCKET",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

/// Transport descriptor of a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type", with = "empty_as_none")]
    pub trans_type: Option<TransportType>,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub endpoint: EndPointInfo,
    #[serde(default)]
    pub security: SecurityInfo,
}

/// Endpoint data in one of three shapes: explicit URIs, host/port
/// addresses, or an opaque alternative document.
///
/// Inbound requests may populate more than one shape; endpoint planning
/// picks the first non-empty one in that order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndPointInfo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<EndPointAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative: Option<serde_json::Value>,
}

impl EndPointInfo {
    /// True when no shape is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty() && self.addresses.is_empty() && self.alternative.is_none()
    }
}

/// One host/port pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndPointAddress {
    pub host: String,
    pub port: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityInfo {
    #[serde(default, rename = "oAuth2Info")]
    pub oauth2_info: OAuth2Info,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2Info {
    #[serde(default)]
    pub grant_types: Vec<String>,
    #[serde(default)]
    pub token_endpoint: String,
}

/// `_links` member; only populated when a liveness interval is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "self")]
    pub self_link: Selves,
}

impl Link {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.self_link.liveness.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selves {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub liveness: String,
}
