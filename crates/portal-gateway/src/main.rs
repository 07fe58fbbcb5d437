//! Portal Gateway
//!
//! Entry point for the BMS portal session gateway.

use portal_gateway::config::Config;
use portal_gateway::observability::init_metrics_recorder;
use portal_gateway::routes::{self, AppState};
use portal_gateway::tasks::{session_sweeper::DEFAULT_SWEEP_INTERVAL_SECONDS, start_session_sweeper};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (JSON lines when LOG_FORMAT=json)
    let json_output = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal_gateway=debug,tower_http=debug".into()),
        )
        .with(json_output.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_output).then(tracing_subscriber::fmt::layer))
        .init();

    info!("Starting Portal Gateway");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        keycloak_url = %config.keycloak_url,
        keycloak_realm = %config.keycloak_realm,
        api_base_url = %config.api_base_url,
        public_url = %config.public_url,
        bind_address = %config.bind_address,
        cookie_secure = config.cookie_secure,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let bind_address = config.bind_address.clone();
    let drain_seconds = config.drain_seconds;

    let state = Arc::new(AppState::new(config).map_err(|e| {
        error!("Failed to create application state: {}", e);
        e
    })?);

    // Background session sweeper
    let cancel_token = CancellationToken::new();
    let sweeper = tokio::spawn(start_session_sweeper(
        state.clone(),
        Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS),
        cancel_token.child_token(),
    ));

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Portal Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_seconds))
    .await?;

    cancel_token.cancel();
    if let Err(e) = sweeper.await {
        warn!("Session sweeper task ended abnormally: {}", e);
    }

    info!("Portal Gateway shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain_seconds: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", drain_seconds);
        tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (PORTAL_DRAIN_SECONDS=0)");
    }
}
