//! MEP core: MP1 service records, the registry property-bag codec, and
//! endpoint planning.

pub mod endpoint;
pub mod error;
pub mod properties;
pub mod registry;
pub mod types;
pub mod validate;

pub use endpoint::{plan_endpoints, EndpointKind, EndpointPlan, ResolvedEndpoints, RouteInfo, SerInfo};
pub use error::{ErrorCode, ProblemDetails};
pub use properties::{decode_instance, encode_instance, to_micro_service, PropertyBag};
pub use registry::{
    FindInstancesRequest, FindInstancesResponse, HealthCheck, MicroService, MicroServiceInstance,
    RegistryStatus,
};
pub use types::{
    CategoryRef, EndPointAddress, EndPointInfo, LocalityType, SerializerType, ServiceInfo,
    ServiceState, TransportInfo, TransportType,
};
pub use validate::{validate_service_info, ValidationError};

