//! Composes the middleware layers around the operation router.

use tower::ServiceBuilder;

use super::load_shed::{LoadShedLayer, LoadShedService};
use super::metrics::{MetricsLayer, MetricsService};
use super::timeout::{TimeoutLayer, TimeoutService};
use crate::service::config::ServerConfig;
use crate::service::router::OperationRouter;

/// The full operation stack, as handed to the HTTP layer.
pub type OperationPipeline = LoadShedService<TimeoutService<MetricsService<OperationRouter>>>;

/// Wraps `router` with, outermost first:
/// 1. `LoadShedLayer`: reject before doing any work
/// 2. `TimeoutLayer`: per-operation deadline
/// 3. `MetricsLayer`: timing and outcome, closest to the handler
#[must_use]
pub fn build_operation_pipeline(router: OperationRouter, config: &ServerConfig) -> OperationPipeline {
    ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(TimeoutLayer)
        .layer(MetricsLayer)
        .service(router)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
