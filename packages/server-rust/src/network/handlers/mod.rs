//! axum handlers and the state they share.

pub mod health;
pub mod mp1;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use mp1::{discover_handler, register_handler};

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::service::middleware::OperationPipeline;

/// Cloned into every handler; all fields are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Operation stack every MP1 request runs through.
    pub operations: OperationPipeline,
    pub shutdown: Arc<ShutdownController>,
    /// Deadline given to each MP1 operation.
    pub operation_timeout_ms: u64,
    pub call_ids: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(
        operations: OperationPipeline,
        shutdown: Arc<ShutdownController>,
        operation_timeout_ms: u64,
    ) -> Self {
        Self {
            operations,
            shutdown,
            operation_timeout_ms,
            call_ids: Arc::new(AtomicU64::new(1)),
            start_time: Instant::now(),
        }
    }
}
