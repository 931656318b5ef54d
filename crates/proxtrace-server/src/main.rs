//! # proxtrace-server
//!
//! Runs the trace coordinator and exposes it over HTTP.
//!
//! ## Running
//!
//! ```bash
//! # Development, simulated radio
//! cargo run --package proxtrace-server
//!
//! # With BlueZ
//! cargo run --package proxtrace-server --features bluetooth
//! ```
//!
//! The config file defaults to `/etc/proxtrace/config.toml` and can be moved
//! with `PROXTRACE_CONFIG`.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use proxtrace_core::{default_config_path, TraceConfig, TraceMode};
use proxtrace_server::{api, lifecycle, logging, state::AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Environment variable overriding the config file location.
const CONFIG_PATH_ENV: &str = "PROXTRACE_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os(CONFIG_PATH_ENV)
        .map_or_else(default_config_path, PathBuf::from);
    let config = TraceConfig::load(Some(config_path.as_path()))
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    logging::init(&config)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting proxtrace-server"
    );

    let state = AppState::new(&config).await?;
    let status_logger = tokio::spawn(lifecycle::log_status_changes(
        state.coordinator.subscribe(),
    ));

    if state.coordinator.ensure_initialized() {
        state.coordinator.start(TraceMode::Background)?;
    } else {
        warn!("Tracing not enabled at startup; waiting for a secret or the radio");
    }

    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.server.listen_addr))?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, api::create_router(state.clone()))
        .with_graceful_shutdown(lifecycle::shutdown_signal())
        .await?;

    info!("Shutting down");
    state.coordinator.stop();
    status_logger.abort();

    Ok(())
}
