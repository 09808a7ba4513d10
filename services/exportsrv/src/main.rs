//! OpenSEE CSV Export Service (`exportsrv`)
//!
//! Serves event waveforms, scalar statistics, correlated sags and harmonic
//! spectra from an openXDA database as CSV downloads.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::serve;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
#[cfg(feature = "swagger-ui")]
use utoipa::OpenApi;
#[cfg(feature = "swagger-ui")]
use utoipa_swagger_ui::SwaggerUi;

use common::service_bootstrap::{self, LoggingOptions, ServiceInfo};
use common::sqlite::SqliteClient;
use errors::{XdaError, XdaResult};
#[cfg(feature = "swagger-ui")]
use exportsrv::ApiDoc;
use exportsrv::{
    config::{ExportsrvConfig, DEFAULT_PORT},
    create_app_state, create_routes,
};

/// Command-line arguments for exportsrv
#[derive(Parser, Clone, Debug)]
#[command(
    name = "exportsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "openXDA OpenSEE CSV Export Service",
    long_about = None
)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// openXDA database path, overrides `database.path`
    #[arg(long)]
    db: Option<String>,

    /// API port, overrides `api.port`
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Validation mode - check configuration and database, then exit
    #[arg(long)]
    validate: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> XdaResult<()> {
    let args = Args::parse();

    let service_info = ServiceInfo::new(
        "exportsrv",
        "OpenSEE CSV Export Service - Waveforms, Statistics, Sags, Harmonics",
        DEFAULT_PORT,
    );

    let mut config = ExportsrvConfig::load(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.database.path = db;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    config.validate()?;

    // Bootstrap: logging, banner
    service_bootstrap::init_logging(
        &service_info,
        &LoggingOptions {
            dir: config.logging.dir.clone(),
            level: config.logging.level.clone(),
            enable_api_log: config.logging.enable_api_log,
        },
    )?;
    if !args.no_color {
        service_bootstrap::print_startup_banner(&service_info);
    }

    // Validation mode: validate and exit
    if args.validate {
        let client = SqliteClient::new_readonly(&config.database.path).await?;
        client.ping().await?;
        info!(
            "Validation completed successfully (database {})",
            config.database.path
        );
        return Ok(());
    }

    let bind_address = config.bind_address();
    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        XdaError::Configuration(format!("Invalid bind address '{}': {}", bind_address, e))
    })?;

    let state = create_app_state(config).await?;
    info!("Starting {} service", state.config.service.name);

    let app = create_routes(state);

    #[cfg(feature = "swagger-ui")]
    let app = {
        info!("Swagger UI feature ENABLED - initializing at /docs");
        app.merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
    };

    #[cfg(not(feature = "swagger-ui"))]
    info!("Swagger UI feature DISABLED");

    let socket = tokio::net::TcpSocket::new_v4()
        .map_err(|e| XdaError::StartupFailed(format!("Failed to create socket: {}", e)))?;
    socket
        .set_reuseaddr(true)
        .map_err(|e| XdaError::StartupFailed(format!("Failed to set SO_REUSEADDR: {}", e)))?;
    socket
        .bind(addr)
        .map_err(|e| XdaError::StartupFailed(format!("Failed to bind to {}: {}", addr, e)))?;
    let listener = socket
        .listen(1024)
        .map_err(|e| XdaError::StartupFailed(format!("Failed to listen: {}", e)))?;

    info!("API server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let shutdown_token = CancellationToken::new();
    let server_token = shutdown_token.clone();
    let server_handle = tokio::spawn(async move {
        let shutdown = async move { server_token.cancelled().await };
        if let Err(e) = serve(listener, app).with_graceful_shutdown(shutdown).await {
            error!("Server error: {}", e);
        }
    });

    shutdown_signal().await;
    info!("Shutdown signal received, draining connections");
    shutdown_token.cancel();

    if let Err(e) = server_handle.await {
        warn!("Server task ended abnormally: {}", e);
    }
    info!("exportsrv stopped");
    Ok(())
}

/// Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
