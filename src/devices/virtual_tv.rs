// virtual_tv.rs
use super::{Device, DeviceFactory, DeviceResult, DeviceType, PowerState, integer, read, text, write};
use crate::{config::DeviceConfig, error::DeviceError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};

const MAX_VOLUME: i64 = 100;
const DEFAULT_INPUTS: [&str; 3] = ["hdmi1", "hdmi2", "tv"];
const DEFAULT_APPS: [&str; 3] = ["netflix", "youtube", "spotify"];

#[derive(Debug, Clone, Serialize)]
struct TvState {
    power: PowerState,
    volume: i64,
    muted: bool,
    channel: i64,
    input: String,
    inputs: Vec<String>,
    active_app: Option<String>,
    apps: Vec<String>,
    last_command: Option<Value>,
    updated_at: DateTime<Utc>,
}

pub struct VirtualTv {
    id: String,
    name: String,
    state: RwLock<TvState>,
}

impl VirtualTv {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_sources(
            id,
            name,
            DEFAULT_INPUTS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_APPS.iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn with_sources(
        id: impl Into<String>,
        name: impl Into<String>,
        inputs: Vec<String>,
        apps: Vec<String>,
    ) -> Self {
        let input = inputs.first().cloned().unwrap_or_default();
        Self {
            id: id.into(),
            name: name.into(),
            state: RwLock::new(TvState {
                power: PowerState::Off,
                volume: 20,
                muted: false,
                channel: 1,
                input,
                inputs,
                active_app: None,
                apps,
                last_command: None,
                updated_at: Utc::now(),
            }),
        }
    }

    fn update<F>(&self, change: F) -> DeviceResult
    where
        F: FnOnce(&mut TvState) -> DeviceResult,
    {
        let mut state = write(&self.state);
        let result = change(&mut state)?;
        state.updated_at = Utc::now();
        Ok(result)
    }

    fn set_power(&self, power: PowerState) -> DeviceResult {
        self.update(|state| {
            state.power = power;
            Ok(power.as_value())
        })
    }

    fn shift_volume(&self, delta: i64) -> DeviceResult {
        self.update(|state| {
            state.volume = state.volume.saturating_add(delta).clamp(0, MAX_VOLUME);
            state.muted = false;
            Ok(json!(state.volume))
        })
    }

    fn shift_channel(&self, delta: i64) -> DeviceResult {
        self.update(|state| {
            state.channel = state.channel.saturating_add(delta).max(1);
            Ok(json!(state.channel))
        })
    }
}

impl Device for VirtualTv {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Tv
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

    fn sleep(&self) -> DeviceResult {
        self.set_power(PowerState::Sleep)
    }

    fn wakeup(&self) -> DeviceResult {
        self.set_power(PowerState::On)
    }

    fn reboot(&self) -> DeviceResult {
        self.update(|state| {
            state.power = PowerState::On;
            state.active_app = None;
            Ok(json!(true))
        })
    }

    fn power_state(&self) -> DeviceResult {
        Ok(read(&self.state).power.as_value())
    }

    fn get_volume(&self) -> DeviceResult {
        Ok(json!(read(&self.state).volume))
    }

    fn set_volume(&self, volume: Option<Value>) -> DeviceResult {
        let Some(volume) = volume else {
            return self.get_volume();
        };
        let volume = integer("volume", &volume)?;
        if !(0..=MAX_VOLUME).contains(&volume) {
            return Err(DeviceError::InvalidArgument(format!(
                "volume out of range: {volume}"
            )));
        }

        self.update(|state| {
            state.volume = volume;
            state.muted = false;
            Ok(json!(volume))
        })
    }

    fn volume_up(&self, steps: Option<Value>) -> DeviceResult {
        self.shift_volume(super::steps(steps.as_ref())?)
    }

    fn volume_down(&self, steps: Option<Value>) -> DeviceResult {
        self.shift_volume(-super::steps(steps.as_ref())?)
    }

    fn mute(&self) -> DeviceResult {
        self.update(|state| {
            state.muted = true;
            Ok(json!(true))
        })
    }

    fn unmute(&self) -> DeviceResult {
        self.update(|state| {
            state.muted = false;
            Ok(json!(false))
        })
    }

    fn get_channel(&self) -> DeviceResult {
        Ok(json!(read(&self.state).channel))
    }

    fn set_channel(&self, channel: Option<Value>) -> DeviceResult {
        let Some(channel) = channel else {
            return self.get_channel();
        };
        let channel = integer("channel", &channel)?;
        if channel < 1 {
            return Err(DeviceError::InvalidArgument(format!(
                "channel out of range: {channel}"
            )));
        }

        self.update(|state| {
            state.channel = channel;
            Ok(json!(channel))
        })
    }

    fn channel_up(&self) -> DeviceResult {
        self.shift_channel(1)
    }

    fn channel_down(&self) -> DeviceResult {
        self.shift_channel(-1)
    }

    fn change_input(&self, selected_input: Option<Value>) -> DeviceResult {
        let Some(selected_input) = selected_input else {
            return Ok(json!(read(&self.state).inputs));
        };
        let selected_input = text("selected_input", &selected_input)?;

        self.update(|state| {
            if !state.inputs.contains(&selected_input) {
                return Err(DeviceError::InvalidArgument(format!(
                    "unknown input: {selected_input}"
                )));
            }
            state.input = selected_input;
            Ok(json!(state.input))
        })
    }

    fn send_command(&self, command: Value) -> DeviceResult {
        self.update(|state| {
            state.last_command = Some(command.clone());
            Ok(json!({ "sent": command }))
        })
    }

    fn get_apps(&self) -> DeviceResult {
        Ok(json!(read(&self.state).apps))
    }

    fn get_active_app(&self) -> DeviceResult {
        Ok(json!(read(&self.state).active_app))
    }

    fn set_app(&self, app: Option<Value>) -> DeviceResult {
        let Some(app) = app else {
            return self.get_active_app();
        };
        let app = text("app", &app)?;

        self.update(|state| {
            if !state.apps.contains(&app) {
                return Err(DeviceError::InvalidArgument(format!("unknown app: {app}")));
            }
            state.active_app = Some(app);
            Ok(json!(state.active_app))
        })
    }
}

pub struct VirtualTvFactory;

impl DeviceFactory for VirtualTvFactory {
    fn driver(&self) -> &'static str {
        "virtual_tv"
    }

    fn create(&self, config: &DeviceConfig) -> anyhow::Result<Arc<dyn Device>> {
        let list = |key: &str, default: &[&str]| -> anyhow::Result<Vec<String>> {
            match config.options.get(key) {
                Some(value) => Ok(serde_json::from_value(value.clone())?),
                None => Ok(default.iter().map(|s| s.to_string()).collect()),
            }
        };

        Ok(Arc::new(VirtualTv::with_sources(
            &config.id,
            config.display_name(),
            list("inputs", &DEFAULT_INPUTS)?,
            list("apps", &DEFAULT_APPS)?,
        )))
    }
}

inventory::submit! {
    &VirtualTvFactory as &'static dyn DeviceFactory
}
