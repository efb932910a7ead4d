// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process assembly — shared by `main` and integration tests.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::transport::{build_router, AppState};

/// Initialize tracing from config. Uses `try_init` so it's safe to call
/// more than once (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Bind, build the router, and serve until `shutdown` is cancelled, then
/// drain live sessions for up to `config.shutdown_drain_timeout()`.
///
/// This is the full production codepath. Split out from [`run`] so
/// integration tests can drive a real listener against a cancellation
/// token they control.
pub async fn serve(config: Arc<Config>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let state = AppState::new(config.clone(), shutdown.clone());

    let idle_sweep = {
        let sessions = state.sessions.clone();
        let sd = shutdown.clone();
        tokio::spawn(async move { sessions.run_idle_sweep(sd).await })
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {}", listener.local_addr()?);

    let router = build_router(state.clone());
    let sd = shutdown.clone();
    axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await?;

    info!("shutting down, draining active sessions");
    let drain = drain_sessions(state.clone());
    if tokio::time::timeout(config.shutdown_drain_timeout(), drain).await.is_err() {
        error!("shutdown drain timed out, exiting with sessions still live");
    }

    idle_sweep.abort();
    Ok(())
}

async fn drain_sessions(state: Arc<AppState>) {
    for id in state.sessions.all_ids().await {
        let _ = state.sessions.end(&id).await;
    }
}

/// Install the SIGTERM/SIGINT handler: first signal cancels `shutdown` for
/// a graceful drain, a second signal forces an immediate exit.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGTERM");
            }
            _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();

        tokio::select! {
            _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGTERM again, forcing exit");
            }
            _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGINT again, forcing exit");
            }
        }
        std::process::exit(130);
    });
}

/// Run the gateway to completion: install tracing, bind, serve, and block
/// until a shutdown signal is received and the drain completes.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());
    serve(config, shutdown).await
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
