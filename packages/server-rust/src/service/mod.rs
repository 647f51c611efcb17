//! Operation execution framework.
//!
//! 1. **Operations** (`operation`): typed MP1 operations with per-call context
//! 2. **Middleware** (`middleware`): tower layers (load shedding, timeout, metrics)
//! 3. **Routing** (`router`): dispatch by `service_name`
//! 4. **Domain** (`domain`): the MP1 service running the task pipelines

pub mod config;
pub mod domain;
pub mod middleware;
pub mod operation;
pub mod router;

pub use config::ServerConfig;
pub use domain::Mp1Service;
pub use operation::{
    service_names, Operation, OperationContext, OperationError, OperationResponse,
};
pub use router::OperationRouter;
