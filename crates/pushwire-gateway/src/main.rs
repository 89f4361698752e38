//! pushwire gateway binary.
//!
//! - Event stream: `GET /v1/event`
//! - Control channel: `/v1/control/{next,respond,submit}`
//! - Config path from argv[1] or `PUSHWIRE_CONFIG`; defaults when absent

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing_subscriber::{fmt, EnvFilter};

use pushwire_core::error::{Result, PushwireError};
use pushwire_gateway::{app_state::AppState, config, server};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "pushwire-gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cfg = match config_path() {
        Some(path) => config::load_from_file(path)?,
        None => config::GatewayConfig::default(),
    };
    let listen: SocketAddr = cfg.gateway.listen.parse().map_err(|e| {
        PushwireError::BadRequest(format!("gateway.listen must be a valid SocketAddr: {e}"))
    })?;

    let state = AppState::new(cfg)?;

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| PushwireError::Internal(format!("bind {listen} failed: {e}")))?;
    tracing::info!(%listen, "pushwire-gateway starting");

    server::serve(listener, state.clone(), shutdown_signal(state))
        .await
        .map_err(|e| PushwireError::Internal(format!("server failed: {e}")))
}

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("PUSHWIRE_CONFIG"))
        .map(PathBuf::from)
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, starting graceful shutdown");
    state.begin_shutdown();
}
