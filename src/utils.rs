// utils.rs
use super::models::AppState;
use crate::metrics;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// `RUST_LOG` wins over the default `info` level.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

pub fn cleanup_client_connection(client_id: Uuid, state: &AppState) {
    state.clients.remove(&client_id);
    metrics::set_bus_clients(state.clients.len());
    info!("Bus client {} disconnected", client_id);
}

pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
