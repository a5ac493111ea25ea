// virtual_light.rs
use super::{Device, DeviceFactory, DeviceResult, DeviceType, PowerState, integer, read, write};
use crate::{config::DeviceConfig, error::DeviceError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Serialize)]
struct LightState {
    power: PowerState,
    brightness: u8,
    color: [u8; 3],
    updated_at: DateTime<Utc>,
}

/// In-memory dimmable colour lamp.
///
/// Besides power it accepts commands: `"toggle"`, `{"brightness": 0..=100}`
/// and `{"color": [r, g, b]}`.
pub struct VirtualLight {
    id: String,
    name: String,
    state: RwLock<LightState>,
}

impl VirtualLight {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: RwLock::new(LightState {
                power: PowerState::Off,
                brightness: 100,
                color: [255, 255, 255],
                updated_at: Utc::now(),
            }),
        }
    }

    fn set_power(&self, power: PowerState) -> DeviceResult {
        let mut state = write(&self.state);
        state.power = power;
        state.updated_at = Utc::now();
        Ok(power.as_value())
    }

    fn apply(&self, command: &Value) -> Result<(), DeviceError> {
        let mut state = write(&self.state);

        match command {
            Value::String(name) if name == "toggle" => {
                state.power = match state.power {
                    PowerState::On => PowerState::Off,
                    PowerState::Off | PowerState::Sleep => PowerState::On,
                };
            }
            Value::Object(fields) if fields.contains_key("brightness") => {
                let brightness = integer("brightness", &fields["brightness"])?;
                if !(0..=100).contains(&brightness) {
                    return Err(DeviceError::InvalidArgument(format!(
                        "brightness out of range: {brightness}"
                    )));
                }
                state.brightness = brightness as u8;
            }
            Value::Object(fields) if fields.contains_key("color") => {
                let color: [u8; 3] = serde_json::from_value(fields["color"].clone())
                    .map_err(|e| DeviceError::InvalidArgument(format!("color: {e}")))?;
                state.color = color;
            }
            other => {
                return Err(DeviceError::InvalidArgument(format!(
                    "unknown light command: {other}"
                )));
            }
        }

        state.updated_at = Utc::now();
        Ok(())
    }
}

impl Device for VirtualLight {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Light
    }

    fn state(&self) -> Value {
        serde_json::to_value(&*read(&self.state)).unwrap_or(Value::Null)
    }

    fn turn_on(&self) -> DeviceResult {
        self.set_power(PowerState::On)
    }

    fn turn_off(&self) -> DeviceResult {
        self.set_power(PowerState::Off)
    }

    fn power_state(&self) -> DeviceResult {
        Ok(read(&self.state).power.as_value())
    }

    fn send_command(&self, command: Value) -> DeviceResult {
        self.apply(&command)?;
        Ok(self.state())
    }
}

pub struct VirtualLightFactory;

impl DeviceFactory for VirtualLightFactory {
    fn driver(&self) -> &'static str {
        "virtual_light"
    }

    fn create(&self, config: &DeviceConfig) -> anyhow::Result<Arc<dyn Device>> {
        let light = VirtualLight::new(&config.id, config.display_name());
        if let Some(brightness) = config.options.get("brightness") {
            light.apply(&json!({ "brightness": brightness }))?;
        }
        Ok(Arc::new(light))
    }
}

inventory::submit! {
    &VirtualLightFactory as &'static dyn DeviceFactory
}
