//! MP1 HTTP server lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the listener, and
//! `serve()` accepts connections until the shutdown future resolves.

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::mp1::SERVICES_PATH;
use super::handlers::{
    discover_handler, health_handler, liveness_handler, readiness_handler, register_handler,
    AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::middleware::OperationPipeline;
use crate::tls::build_server_tls;

/// How long shutdown waits for in-flight MP1 requests.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Assembles routes and HTTP middleware over `state`.
///
/// - `GET /health`, `GET /health/live`, `GET /health/ready`
/// - `GET|POST /mep/mec_service_mgmt/v1/applications/{appInstanceId}/services`
pub fn build_router(state: AppState, config: &NetworkConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route(SERVICES_PATH, get(discover_handler).post(register_handler))
        .layer(build_http_layers(config))
        .with_state(state)
}

pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    operations: OperationPipeline,
    operation_timeout_ms: u64,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, operations: OperationPipeline, operation_timeout_ms: u64) -> Self {
        Self {
            config,
            listener: None,
            operations,
            operation_timeout_ms,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Binds the listener and returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called, the listener TLS
    /// configuration cannot be loaded, or the server hits a fatal I/O error.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let controller = self.shutdown;
        let state = AppState::new(
            self.operations,
            Arc::clone(&controller),
            self.operation_timeout_ms,
        );
        let router = build_router(state, &self.config);

        controller.set_ready();

        // Readiness fails as soon as the signal arrives, while the listener
        // finishes the connections it already accepted.
        let (draining_tx, draining_rx) = oneshot::channel();
        let signal = {
            let controller = Arc::clone(&controller);
            async move {
                shutdown.await;
                controller.trigger_shutdown();
                info!(in_flight = controller.in_flight_count(), "shutdown requested, draining");
                let _ = draining_tx.send(());
            }
        };

        match &self.config.tls {
            Some(tls) => {
                let server_config = build_server_tls(&tls.cert_path, &tls.key_path)?;
                serve_tls(listener, router, server_config, signal).await?;
            }
            None => {
                info!("serving plain HTTP");
                let server = axum::serve(listener, router)
                    .with_graceful_shutdown(signal)
                    .into_future();
                tokio::pin!(server);
                tokio::select! {
                    res = &mut server => res?,
                    Ok(()) = draining_rx => {
                        if let Ok(res) = tokio::time::timeout(DRAIN_TIMEOUT, &mut server).await {
                            res?;
                        }
                    }
                }
            }
        }

        finish_drain(&controller).await;
        Ok(())
    }
}

async fn serve_tls(
    listener: TcpListener,
    router: Router,
    server_config: Arc<rustls::ServerConfig>,
    signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        signal.await;
        shutdown_handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
    });

    info!(%addr, "serving HTTPS");
    axum_server::from_tcp_rustls(std_listener, RustlsConfig::from_config(server_config))
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

/// The listener already waited up to `DRAIN_TIMEOUT`; anything still
/// counted here is abandoned.
async fn finish_drain(controller: &ShutdownController) {
    controller.trigger_shutdown();
    if controller.wait_for_drain(Duration::ZERO).await {
        info!("all requests drained");
    } else {
        warn!(in_flight = controller.in_flight_count(), "drain timeout expired");
    }
}
