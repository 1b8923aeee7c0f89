//! Console bridge daemon.
//!
//! Accepts browser agents on `/ws` and serves the JSON query API under
//! `/api` on the same listener.
//!
//! Run with: cargo run -p console-bridge-server -- --port 3333

mod api;
mod config;
mod error;
mod state;

use anyhow::Context;
use clap::Parser;
use console_bridge_transport::websocket::create_ws_router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::Config, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::parse();
    let state = AppState::from_config(&config);

    let app = api::router(state.clone())
        .merge(create_ws_router(state.manager.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    let addr = listener.local_addr()?;
    tracing::info!(
        max_logs = config.max_logs,
        working_dir = %state.working_dir.display(),
        "Console bridge listening on ws://{addr}/ws"
    );

    state.manager.start();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .context("Server error")?;

    tracing::info!("Console bridge stopped");
    Ok(())
}

/// Wait for SIGINT/SIGTERM, then stop the prober and close streams.
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutting down");
    state.manager.stop().await;
    let _ = state.shutdown.send(());
}
