//! Operation stack layers, outermost first.
//!
//! - [`load_shed`]: reject MP1 calls past the concurrency limit
//! - [`timeout`]: per-call deadline
//! - [`metrics`]: duration and outcome on the `operation` span
//!
//! [`pipeline`] assembles them around the router.

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_operation_pipeline, OperationPipeline};
pub use timeout::TimeoutLayer;
