//! Load shedding: once `max_concurrent_operations` MP1 calls are running,
//! further calls fail with `OperationError::Overloaded` instead of queueing.

use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tower::{Layer, Service};
use tracing::warn;

use crate::service::operation::{Operation, OperationError, OperationFuture, OperationResponse};

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Every service built from one layer shares the same permit pool.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    permits: Arc<Semaphore>,
    limit: u32,
}

impl LoadShedLayer {
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent as usize)),
            limit: max_concurrent,
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            permits: Arc::clone(&self.permits),
            limit: self.limit,
        }
    }
}

// ---------------------------------------------------------------------------
// LoadShedService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    permits: Arc<Semaphore>,
    limit: u32,
}

impl<S> LoadShedService<S> {
    /// Operations currently holding a permit.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        (self.limit as usize).saturating_sub(self.permits.available_permits())
    }
}

impl<S> Service<Operation> for LoadShedService<S>
where
    S: Service<Operation, Response = OperationResponse, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = OperationFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => {
                let fut = self.inner.call(op);
                Box::pin(async move {
                    let _permit = permit;
                    fut.await
                })
            }
            Err(_) => {
                warn!(
                    call_id = op.ctx().call_id,
                    operation = op.kind(),
                    limit = self.limit,
                    "mp1 operation shed"
                );
                Box::pin(std::future::ready(Err(OperationError::Overloaded)))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::stub::{discover, register, StubService};

    #[tokio::test]
    async fn passes_through_under_limit() {
        let svc = LoadShedLayer::new(4).layer(StubService::replying(201));
        let resp = svc.oneshot(register(7, 5000)).await.unwrap();
        assert_eq!(resp.call_id, 7);
        assert_eq!(resp.reply.status, 201);
    }

    #[tokio::test(start_paused = true)]
    async fn sheds_while_permits_are_held() {
        let mut svc = LoadShedLayer::new(1).layer(StubService::slow(500));

        let held = tokio::spawn(svc.call(discover(1, 5000)));
        tokio::task::yield_now().await;
        assert_eq!(svc.in_flight(), 1);

        let err = svc.call(discover(2, 5000)).await.unwrap_err();
        assert!(matches!(err, OperationError::Overloaded));
        assert_eq!(err.http_status(), 503);

        held.await.unwrap().unwrap();
        assert_eq!(svc.in_flight(), 0);
        let resp = svc.call(discover(3, 5000)).await.unwrap();
        assert_eq!(resp.call_id, 3);
    }
}
