//! Domain services behind the operation router.
//!
//! [`Mp1Service`] answers MP1 operations by running the matching task
//! pipeline. Pipeline failures are already rendered into the reply, so the
//! service itself never returns an error.

use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::debug;

use crate::mp1::{
    discover_pipeline, register_pipeline, DiscoverContext, Mp1Deps, RegisterContext,
};
use crate::pipeline::{Pipeline, PipelineError};
use crate::service::operation::{Operation, OperationError, OperationFuture, OperationResponse};

/// MP1 service-management domain service.
#[derive(Clone)]
pub struct Mp1Service {
    discover: Arc<Pipeline<DiscoverContext>>,
    register: Arc<Pipeline<RegisterContext>>,
}

impl Mp1Service {
    /// Builds both pipelines over `deps`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if either pipeline's wiring is inconsistent.
    pub fn new(deps: &Mp1Deps) -> Result<Self, PipelineError> {
        Ok(Self {
            discover: Arc::new(discover_pipeline(deps)?),
            register: Arc::new(register_pipeline(deps)?),
        })
    }
}

impl Service<Operation> for Mp1Service {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = OperationFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let discover = Arc::clone(&self.discover);
        let register = Arc::clone(&self.register);
        Box::pin(async move {
            let (call_id, reply) = match op {
                Operation::Discover { ctx, request } => {
                    let done = discover.run(DiscoverContext::new(request)).await;
                    (ctx.call_id, done.into_reply())
                }
                Operation::Register { ctx, request } => {
                    let done = register.run(RegisterContext::new(request)).await;
                    (ctx.call_id, done.into_reply())
                }
            };
            debug!(call_id, status = reply.status, "mp1 operation replied");
            Ok(OperationResponse { call_id, reply })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
