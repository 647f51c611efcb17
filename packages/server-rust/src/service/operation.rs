//! Operation types flowing through the tower middleware stack.

use std::future::Future;
use std::pin::Pin;

use crate::mp1::{MepReply, MepRequest};

/// Future returned by every service in the operation stack.
pub type OperationFuture =
    Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

/// Names operations are routed by.
pub mod service_names {
    pub const MP1: &str = "mp1";
}

/// Context carried with every operation through the middleware.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub call_id: u64,
    pub service_name: &'static str,
    pub call_timeout_ms: u64,
}

impl OperationContext {
    #[must_use]
    pub fn new(call_id: u64, service_name: &'static str, call_timeout_ms: u64) -> Self {
        Self {
            call_id,
            service_name,
            call_timeout_ms,
        }
    }
}

/// MP1 service-management operations.
#[derive(Debug)]
#[non_exhaustive]
pub enum Operation {
    /// Find service instances.
    Discover { ctx: OperationContext, request: MepRequest },
    /// Register a service description.
    Register { ctx: OperationContext, request: MepRequest },
}

impl Operation {
    #[must_use]
    pub fn ctx(&self) -> &OperationContext {
        match self {
            Self::Discover { ctx, .. } | Self::Register { ctx, .. } => ctx,
        }
    }

    /// Short operation name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Discover { .. } => "discover",
            Self::Register { .. } => "register",
        }
    }
}

/// Successful operation outcome: the reply the pipeline produced, which may
/// itself carry an MP1 error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResponse {
    pub call_id: u64,
    pub reply: MepReply,
}

/// Errors raised by the middleware or router, outside any pipeline.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("unknown service: {name}")]
    UnknownService { name: String },
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OperationError {
    /// HTTP status reported for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Overloaded => 503,
            Self::Timeout { .. } => 504,
            Self::UnknownService { .. } | Self::Internal(_) => 500,
        }
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod stub {
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tower::Service;

    use super::*;

    /// Replies with `status` after `delay`.
    #[derive(Clone, Default)]
    pub(crate) struct StubService {
        pub status: u16,
        pub delay: Duration,
    }

    impl StubService {
        pub(crate) fn replying(status: u16) -> Self {
            Self {
                status,
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn slow(delay_ms: u64) -> Self {
            Self {
                status: 200,
                delay: Duration::from_millis(delay_ms),
            }
        }
    }

    impl Service<Operation> for StubService {
        type Response = OperationResponse;
        type Error = OperationError;
        type Future = OperationFuture;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, op: Operation) -> Self::Future {
            let Self { status, delay } = *self;
            let call_id = op.ctx().call_id;
            Box::pin(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(OperationResponse {
                    call_id,
                    reply: MepReply {
                        status,
                        body: bytes::Bytes::new(),
                    },
                })
            })
        }
    }

    pub(crate) fn discover(call_id: u64, timeout_ms: u64) -> Operation {
        Operation::Discover {
            ctx: OperationContext::new(call_id, service_names::MP1, timeout_ms),
            request: MepRequest::default(),
        }
    }

    pub(crate) fn register(call_id: u64, timeout_ms: u64) -> Operation {
        Operation::Register {
            ctx: OperationContext::new(call_id, service_names::MP1, timeout_ms),
            request: MepRequest::default(),
        }
    }
}
