//! # ReStream Live-Event Relay
//!
//! Keeps one `text/event-stream` connection to the upstream open and re-serves
//! every event to any number of local SSE clients on `/events`.
//!
//! ## Execution Flow:
//! 1.  Load `.env`, then layered configuration (defaults, file, env/CLI).
//! 2.  Install console + rolling JSON file logging.
//! 3.  Start the relay. A missing credential is fatal and exits non-zero.
//! 4.  Serve `/events`, `/health` and `/stats` until the relay is cancelled by
//!     Ctrl-C / SIGTERM, then wait out the shutdown grace period.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use lib_relay::loggers::setup_logging;
use lib_relay::{HttpConnector, RelayLifecycle};

mod relay_logic;
use relay_logic::{config, downstream};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal.
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    let _log_guard = setup_logging(config.log_dir(), config.log_level(), "server_relay")
        .context("Failed to initialise logging")?;

    let upstream_url = config.upstream_url()?;
    let options = config.relay_options();
    tracing::info!(
        upstream = upstream_url,
        port = config.port(),
        retry_delay_ms = options.retry_delay.as_millis() as u64,
        queue_capacity = options.queue_capacity,
        "ReStream relay booting"
    );

    let relay = Arc::new(RelayLifecycle::new(HttpConnector::new(), options));
    relay
        .ensure_started(upstream_url, config.api_key())
        .await
        .inspect_err(|e| tracing::error!("Relay cannot start: {}", e))?;

    let app = downstream::router(Arc::new(downstream::AppState::new(Arc::clone(&relay))));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("SSE relay live at http://{}/events", addr);

    let token = relay.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    if !relay.wait().await {
        tracing::warn!("Shutdown grace period elapsed with work still in flight");
    }
    tracing::info!("Shutdown complete.");
    Ok(())
}
