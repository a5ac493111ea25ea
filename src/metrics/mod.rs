// metrics/mod.rs
use crate::error::AppError;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub const DISPATCH_TOTAL: &str = "iot_dispatch_total";
pub const BUS_CLIENTS: &str = "iot_bus_clients";

/// Serves `/metrics` on `port`. Must be called from inside the tokio runtime.
pub fn setup_metrics(port: u16) -> Result<(), AppError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| AppError::Metrics(e.to_string()))
}

pub fn record_dispatch(topic: &str, outcome: &'static str) {
    metrics::counter!(DISPATCH_TOTAL, "topic" => topic.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn set_bus_clients(count: usize) {
    metrics::gauge!(BUS_CLIENTS).set(count as f64);
}
