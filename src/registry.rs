// registry.rs
use crate::devices::{Device, DeviceInfo};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Known devices keyed by id. Sharded read/write locking lets registration
/// run alongside dispatch.
#[derive(Default)]
pub struct Registry {
    devices: DashMap<String, Arc<dyn Device>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `device` under its own id, replacing any device already there.
    pub fn register(&self, device: Arc<dyn Device>) -> Option<Arc<dyn Device>> {
        let id = device.id().to_string();
        let previous = self.devices.insert(id.clone(), device);
        if previous.is_some() {
            warn!(device_id = %id, "Device replaced");
        } else {
            info!(device_id = %id, "Device registered");
        }
        previous
    }

    pub fn unregister(&self, device_id: &str) -> Option<Arc<dyn Device>> {
        let removed = self.devices.remove(device_id).map(|(_, device)| device);
        if removed.is_some() {
            info!(%device_id, "Device unregistered");
        }
        removed
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<dyn Device>> {
        self.devices
            .get(device_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn infos(&self) -> Vec<DeviceInfo> {
        let mut infos: Vec<DeviceInfo> = self.devices.iter().map(|e| e.value().info()).collect();
        infos.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        infos
    }

    /// The whole registry as `{device_id: device_info}`.
    pub fn to_json(&self) -> Value {
        let devices: Map<String, Value> = self
            .infos()
            .into_iter()
            .map(|info| {
                let id = info.device_id.clone();
                (id, serde_json::to_value(info).unwrap_or(Value::Null))
            })
            .collect();
        Value::Object(devices)
    }
}
