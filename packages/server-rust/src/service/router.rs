//! Operation routing: dispatches an `Operation` to the service registered
//! under its `service_name`.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::util::BoxCloneSyncService;
use tower::Service;

use super::operation::{Operation, OperationError, OperationFuture, OperationResponse};

type BoxedService = BoxCloneSyncService<Operation, OperationResponse, OperationError>;

// ---------------------------------------------------------------------------
// OperationRouter
// ---------------------------------------------------------------------------

/// Routes operations by `service_name`. An unregistered name fails with
/// `OperationError::UnknownService`.
///
/// Cloning is cheap: each clone gets its own handle on the registered
/// services, so concurrent requests never contend on the router.
#[derive(Clone, Default)]
pub struct OperationRouter {
    services: Arc<HashMap<&'static str, BoxedService>>,
}

impl OperationRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` for `name`, replacing any earlier registration.
    pub fn register<S>(&mut self, name: &'static str, service: S)
    where
        S: Service<Operation, Response = OperationResponse, Error = OperationError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Arc::make_mut(&mut self.services).insert(name, BoxCloneSyncService::new(service));
    }

    /// Registered service names, sorted.
    #[must_use]
    pub fn service_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.services.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Service<Operation> for OperationRouter {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = OperationFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is checked per call on a fresh clone of the target service.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let service_name = op.ctx().service_name;
        let Some(svc) = self.services.get(service_name).cloned() else {
            return Box::pin(async move {
                Err(OperationError::UnknownService {
                    name: service_name.to_string(),
                })
            });
        };
        Box::pin(tower::ServiceExt::oneshot(svc, op))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::service_names;
    use crate::service::operation::stub::{discover, StubService};

    fn routed(name: &'static str) -> Operation {
        let mut op = discover(1, 5000);
        if let Operation::Discover { ctx, .. } = &mut op {
            ctx.service_name = name;
        }
        op
    }

    #[tokio::test]
    async fn routes_to_registered_service() {
        let mut router = OperationRouter::new();
        router.register(service_names::MP1, StubService::replying(200));

        let resp = router.oneshot(routed(service_names::MP1)).await.unwrap();
        assert_eq!(resp.reply.status, 200);
    }

    #[tokio::test]
    async fn unknown_service_returns_error() {
        let mut router = OperationRouter::new();
        router.register(service_names::MP1, StubService::replying(200));

        let err = router.oneshot(routed("mp2")).await.unwrap_err();
        assert!(matches!(err, OperationError::UnknownService { ref name } if name == "mp2"));
        assert_eq!(err.http_status(), 500);
    }

    #[tokio::test]
    async fn later_registration_replaces_earlier() {
        let mut router = OperationRouter::new();
        router.register(service_names::MP1, StubService::replying(201));
        let before = router.clone();
        router.register(service_names::MP1, StubService::replying(202));
        router.register("mp2", StubService::replying(200));

        assert_eq!(router.service_names(), vec!["mp1", "mp2"]);
        assert_eq!(before.service_names(), vec!["mp1"]);
        let resp = router.oneshot(routed(service_names::MP1)).await.unwrap();
        assert_eq!(resp.reply.status, 202);
        let resp = before.oneshot(routed(service_names::MP1)).await.unwrap();
        assert_eq!(resp.reply.status, 201);
    }
}
