// main.rs
use axum::{Router, routing::{get, post}};
use iot_dispatcher::{
    Dispatcher, EventBus, Registry,
    config::Settings,
    devices::build_device,
    docs, handlers::*, metrics,
    models::AppState,
    utils,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_tracing();

    let settings = Settings::new()
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    if settings.metrics.enabled {
        metrics::setup_metrics(settings.metrics.port)?;
        tracing::info!("Metrics exporter on port {}", settings.metrics.port);
    }

    let bus = Arc::new(EventBus::with_capacity(settings.bus.capacity));
    let registry = Arc::new(Registry::new());
    for device in &settings.devices {
        let handle = build_device(device)
            .map_err(|e| anyhow::anyhow!("Failed to build device {}: {}", device.id, e))?;
        registry.register(handle);
    }

    let dispatcher = Dispatcher::new(bus.clone(), registry.clone(), settings.dispatcher.clone());
    dispatcher.start();

    let state = Arc::new(AppState::new(
        bus,
        registry,
        Duration::from_millis(settings.server.request_timeout_ms),
    ));

    let app = Router::new()
        .route("/ws/bus", get(handle_bus_ws_upgrade))
        .route("/api/request", post(post_request))
        .route("/api/devices", get(get_devices))
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", docs::ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.server.address)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind address: {}", e))?;

    tracing::info!("Server started on {}", settings.server.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(utils::shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    dispatcher.shutdown();

    Ok(())
}
