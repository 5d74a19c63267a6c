//! Mockhive controller server.
//!
//! # Environment Variables
//!
//! - `MOCKHIVE_SELF_HOST`: host IP of this instance (skipped during broadcast)
//! - `MOCKHIVE_LISTEN_HOST` / `MOCKHIVE_LISTEN_PORT`: bind address
//! - `MOCKHIVE_ENDPOINT_PREFIX`: URL prefix for the forwarding endpoints
//! - `MOCKHIVE_FORWARD_TIMEOUT_SECS`: timeout for one peer forwarding call
//! - `MOCKHIVE_DIRECTORY_PATH`: JSON file with controller hosts and peer
//!   instances (static deployments)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mockhive_dispatch::{
    ChannelRegistry, ControllerConfig, Dispatcher, NoopMetricsStore, StaticDirectory,
};
use mockhive_rest::{router, AppState, HttpPeerClient};

fn config_from_env() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    if let Ok(host) = std::env::var("MOCKHIVE_SELF_HOST") {
        config.self_host = host;
    }
    if let Ok(host) = std::env::var("MOCKHIVE_LISTEN_HOST") {
        config.listen_host = host;
    }
    if let Some(port) = std::env::var("MOCKHIVE_LISTEN_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        config.listen_port = port;
    }
    if let Ok(prefix) = std::env::var("MOCKHIVE_ENDPOINT_PREFIX") {
        config.endpoint_prefix = prefix;
    }
    if let Some(secs) = std::env::var("MOCKHIVE_FORWARD_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        config.forward_timeout_secs = secs;
    }
    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mockhive_rest=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config_from_env();
    tracing::info!(
        self_host = %config.self_host,
        prefix = %config.endpoint_prefix,
        "Starting mockhive controller"
    );

    let directory = match std::env::var("MOCKHIVE_DIRECTORY_PATH").map(PathBuf::from) {
        Ok(path) => StaticDirectory::load(&path)
            .map_err(|e| format!("Failed to load directory {}: {}", path.display(), e))?,
        Err(_) => {
            tracing::warn!(
                "MOCKHIVE_DIRECTORY_PATH not set; peer broadcast will fail until a \
                 directory is configured"
            );
            StaticDirectory::default()
        }
    };

    // Agents register their channels here as they connect.
    let registry = Arc::new(ChannelRegistry::new());

    let peers = Arc::new(HttpPeerClient::new(&config)?);
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        Arc::new(directory),
        peers,
        Arc::new(NoopMetricsStore),
        config.clone(),
    ));

    let addr: SocketAddr = format!("{}:{}", config.listen_host, config.listen_port)
        .parse()
        .map_err(|e| format!("Invalid host:port combination: {}", e))?;

    let app = router(AppState { dispatcher })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        },
    }
}
