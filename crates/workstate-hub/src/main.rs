mod config;
mod error;
mod ingest;
mod logging;
mod render;
mod routes;
mod sweeper;

use render::{DashboardPage, ViewConfig};
use routes::AppState;
use std::{net::SocketAddr, process::ExitCode, sync::Arc};
use tokio::sync::watch;
use tracing::{error, info};
use workstate_core::SessionStore;

#[tokio::main]
async fn main() -> ExitCode {
    let config = config::load_config();
    logging::init_logging(&config);

    let addr: SocketAddr = match config.addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.addr);
            eprintln!("workstate-hub: invalid listen address {:?}: {err}", config.addr);
            return ExitCode::FAILURE;
        }
    };
    if !addr.ip().is_loopback() {
        error!(event = "invalid_addr", addr = %config.addr, reason = "not_loopback");
        eprintln!("workstate-hub: refusing to listen on non-loopback address {addr}");
        return ExitCode::FAILURE;
    }

    let page = match DashboardPage::new(ViewConfig {
        refresh_interval: config.refresh_interval,
        advisory_threshold: config.advisory_threshold,
    }) {
        Ok(value) => value,
        Err(err) => {
            error!(event = "template_error", error = %err);
            eprintln!("workstate-hub: dashboard template failed to load: {err}");
            return ExitCode::FAILURE;
        }
    };

    let store = Arc::new(SessionStore::new(config.store));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = sweeper::spawn_sweeper(store.clone(), config.sweep_interval, shutdown_rx);

    let state = Arc::new(AppState::new(store, page));
    let app = routes::router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "hub_error", error = %err, addr = %addr);
            eprintln!("workstate-hub: cannot listen on {addr}: {err}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        event = "hub_start",
        addr = %addr,
        url = %format!("http://{addr}"),
        sweep_seconds = config.sweep_interval.as_secs(),
        thread_expiry_seconds = config.store.thread_expiry.as_secs()
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;

    match result {
        Ok(()) => {
            info!(event = "hub_stop");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(event = "hub_error", error = %err);
            ExitCode::FAILURE
        }
    }
}
