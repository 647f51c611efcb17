//! Clients for the platform's external collaborators: the API gateway
//! admin API, the DNS manager, and the optional endpoint hook.

pub mod apigw;
pub mod dns;
pub mod hook;

pub use apigw::{GatewayError, GatewayRegistrar, KongClient};
pub use dns::{DnsClient, DnsError};
pub use hook::ApiHook;

/// Content type sent with every JSON request to an external service.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
