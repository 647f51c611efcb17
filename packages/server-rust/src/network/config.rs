//! Listener configuration for the MP1 HTTP server.

use std::path::PathBuf;
use std::time::Duration;

/// Bind address, optional TLS and request deadline.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Serve HTTPS when set.
    pub tls: Option<TlsConfig>,
    /// Maximum time an HTTP request may take end to end.
    pub request_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            tls: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Listener certificate and key, both PEM.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}
