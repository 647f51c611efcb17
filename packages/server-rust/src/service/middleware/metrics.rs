//! Operation telemetry: each call runs inside an `operation` span that
//! records its duration and outcome once it completes.

use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{field, info, info_span, Instrument, Span};

use crate::service::operation::{Operation, OperationError, OperationFuture, OperationResponse};

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

/// `ok` for 2xx replies, `rejected` for MP1 problem replies, `error` when
/// the stack itself failed the call.
fn outcome(result: &Result<OperationResponse, OperationError>) -> &'static str {
    match result {
        Ok(rsp) if (200..300).contains(&rsp.reply.status) => "ok",
        Ok(_) => "rejected",
        Err(_) => "error",
    }
}

/// Status reported for the call, whichever side produced it.
fn status(result: &Result<OperationResponse, OperationError>) -> u16 {
    match result {
        Ok(rsp) => rsp.reply.status,
        Err(e) => e.http_status(),
    }
}

impl<S> Service<Operation> for MetricsService<S>
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
        let span = info_span!(
            "operation",
            service = op.ctx().service_name,
            operation = op.kind(),
            call_id = op.ctx().call_id,
            duration_ms = field::Empty,
            status = field::Empty,
            outcome = field::Empty,
        );
        let started = Instant::now();
        let fut = self.inner.call(op);

        Box::pin(
            async move {
                let result = fut.await;
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                let (status, outcome) = (status(&result), outcome(&result));

                let span = Span::current();
                span.record("duration_ms", duration_ms);
                span.record("status", status);
                span.record("outcome", outcome);
                if let Err(e) = &result {
                    info!(duration_ms, status, outcome, error = %e, "mp1 operation finished");
                } else {
                    info!(duration_ms, status, outcome, "mp1 operation finished");
                }
                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
