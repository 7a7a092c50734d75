use std::sync::Arc;
use std::time::Duration;

use dispatch_core::api::rest::router;
use dispatch_core::config::Config;
use dispatch_core::engine::watcher::run_acceptance_watcher;
use dispatch_core::error::AppError;
use dispatch_core::outbound::http::{HttpNotifier, HttpTrackingClient};
use dispatch_core::outbound::{run_outbound_relay, Collaborators};
use dispatch_core::state::AppState;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let shared_state = Arc::new(AppState::new(
        config.dispatch.clone(),
        config.event_buffer_size,
    ));

    let collaborators = collaborators(&config)?;
    tokio::spawn(run_outbound_relay(
        shared_state.events_tx.subscribe(),
        collaborators,
    ));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let watcher = tokio::spawn(run_acceptance_watcher(shared_state.clone(), shutdown_rx));

    let app = router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        acceptance_window_secs = config.dispatch.acceptance_window_secs,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    let _ = shutdown_tx.send(());
    if let Err(err) = watcher.await {
        tracing::error!(error = %err, "acceptance watcher task failed");
    }

    Ok(())
}

fn collaborators(config: &Config) -> Result<Collaborators, AppError> {
    let timeout = Duration::from_millis(config.side_call_timeout_ms);
    let mut collaborators = Collaborators::log_only(timeout);

    if let Some(url) = &config.notification_service_url {
        let notifier = HttpNotifier::new(url, timeout)
            .map_err(|err| AppError::Internal(format!("notification client: {err}")))?;
        collaborators.notifier = Arc::new(notifier);
    }
    if let Some(url) = &config.tracking_service_url {
        let tracking = HttpTrackingClient::new(url, timeout)
            .map_err(|err| AppError::Internal(format!("tracking client: {err}")))?;
        collaborators.tracking = Arc::new(tracking);
    }

    Ok(collaborators)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
