//! AUV fleet control plane — REST server entry point.

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use auv_control_api::config::ApiConfig;
use auv_control_api::state::AppState;
use auv_control_api::{routes, sweep};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // LOG_LEVEL (spec §6) takes precedence over RUST_LOG; this runs before
    // ApiConfig::from_env() because logging has to be up for whatever that
    // does next.
    let env_filter = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(EnvFilter::from_default_env);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "auv-control-api starting");

    let config = ApiConfig::from_env();
    let state = if config.database_url.is_some() {
        AppState::connect(config).await?
    } else {
        tracing::warn!("DATABASE_URL not set, running with in-memory backend");
        AppState::in_memory(config)
    };

    let sweep_handle = tokio::spawn(sweep::run(state.clone()));

    let app = routes::build_router(state.clone());

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweep_handle.abort();

    Ok(())
}

/// Resolves on SIGTERM or ctrl_c, whichever comes first, so the sweep task
/// and the HTTP server are stopped together at shutdown rather than the
/// sweep loop dangling for the life of the process (spec §9: it "starts at
/// boot and is cancelled on shutdown").
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl_c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
