// models.rs
use crate::events::EventBus;
use crate::registry::Registry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct AppState {
    pub bus: Arc<EventBus>,
    pub registry: Arc<Registry>,
    /// Connected websocket clients and when they connected.
    pub clients: DashMap<Uuid, DateTime<Utc>>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(bus: Arc<EventBus>, registry: Arc<Registry>, request_timeout: Duration) -> Self {
        Self {
            bus,
            registry,
            clients: DashMap::new(),
            request_timeout,
        }
    }
}
