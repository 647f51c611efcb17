//! MEP server: MP1 service registration and discovery over HTTP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use mep_server::appconf::{AppConfig, GatewaySettings, DEFAULT_APP_CONF_PATH};
use mep_server::codec::EndpointResolver;
use mep_server::extif::{GatewayRegistrar, KongClient};
use mep_server::mp1::Mp1Deps;
use mep_server::network::{NetworkConfig, NetworkModule, TlsConfig};
use mep_server::service::middleware::build_operation_pipeline;
use mep_server::service::{service_names, Mp1Service, OperationRouter, ServerConfig};
use mep_server::store::{LocalIndex, MemoryRegistry};
use mep_server::tls::build_client_tls;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "mep-server", version, about = "MEP service registry front end")]
struct Cli {
    #[arg(long, env = "MEP_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "MEP_PORT", default_value_t = 8088)]
    port: u16,

    /// Platform properties file. Pass an empty value to run without one.
    #[arg(long, env = "MEP_APP_CONF", default_value = DEFAULT_APP_CONF_PATH)]
    app_conf: PathBuf,

    /// `host:port` written into gateway URIs handed to consumers.
    #[arg(long, env = "MEP_PUBLIC_GATEWAY")]
    public_gateway: Option<String>,

    #[arg(long, env = "MEP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[arg(long, env = "MEP_OPERATION_TIMEOUT_MS", default_value_t = 30_000)]
    operation_timeout_ms: u64,

    #[arg(long, env = "MEP_MAX_CONCURRENT_OPERATIONS", default_value_t = 1000)]
    max_concurrent_operations: u32,

    #[arg(long, env = "MEP_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// Listener certificate (PEM). HTTPS is served when both cert and key are set.
    #[arg(long, env = "MEP_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    #[arg(long, env = "MEP_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

impl Cli {
    fn network_config(&self) -> NetworkConfig {
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
            _ => None,
        };
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            default_operation_timeout_ms: self.operation_timeout_ms,
            max_concurrent_operations: self.max_concurrent_operations,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Gateway client when `apigw_host` is configured. Without one, routes are
/// planned but never published.
fn gateway(settings: &GatewaySettings) -> anyhow::Result<Option<Arc<dyn GatewayRegistrar>>> {
    if !settings.is_configured() {
        warn!("apigw_host not configured, gateway routes will not be published");
        return Ok(None);
    }
    let tls = build_client_tls(settings).context("gateway TLS configuration")?;
    let client = KongClient::from_settings(settings, &tls).context("gateway client")?;
    info!(base_url = client.base_url(), "api gateway client ready");
    Ok(Some(Arc::new(client)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let app_conf = AppConfig::load(&cli.app_conf).context("load platform configuration")?;
    let mut settings = GatewaySettings::from_config(&app_conf);
    if let Some(authority) = &cli.public_gateway {
        settings.public_authority.clone_from(authority);
    }

    let deps = Mp1Deps {
        registry: Arc::new(MemoryRegistry::new()),
        index: Arc::new(LocalIndex::new()),
        resolver: Arc::new(EndpointResolver::new(
            settings.public_authority.clone(),
            gateway(&settings)?,
        )),
        hook: None,
    };

    let server_config = cli.server_config();
    let mut router = OperationRouter::new();
    router.register(service_names::MP1, Mp1Service::new(&deps)?);
    let operations = build_operation_pipeline(router, &server_config);

    let mut network = NetworkModule::new(
        cli.network_config(),
        operations,
        server_config.default_operation_timeout_ms,
    );
    let port = network.start().await?;
    info!(port, public_gateway = %settings.public_authority, "mep-server started");

    network.serve(shutdown_signal()).await?;
    info!("mep-server stopped");
    Ok(())
}
