//! Optional endpoint rewrite hook applied to discovery results.

use mep_core::EndPointInfo;

/// Supplies the endpoint that replaces each discovered service's endpoint.
///
/// An endpoint with neither URIs nor addresses means "leave results alone".
pub trait ApiHook: Send + Sync {
    fn endpoint(&self) -> EndPointInfo;
}

impl<F> ApiHook for F
where
    F: Fn() -> EndPointInfo + Send + Sync,
{
    fn endpoint(&self) -> EndPointInfo {
        self()
    }
}
