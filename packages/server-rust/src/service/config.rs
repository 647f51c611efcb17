/// Configuration for the operation middleware.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Timeout applied to each MP1 operation, in milliseconds.
    pub default_operation_timeout_ms: u64,
    /// Concurrent operations allowed before load shedding.
    pub max_concurrent_operations: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_operation_timeout_ms: 30_000,
            max_concurrent_operations: 1000,
        }
    }
}
