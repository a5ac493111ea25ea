// devices/mod.rs
mod driver;
mod virtual_light;
mod virtual_thermostat;
mod virtual_tv;

pub use driver::{DeviceFactory, build_device, drivers};
pub use virtual_light::VirtualLight;
pub use virtual_thermostat::VirtualThermostat;
pub use virtual_tv::VirtualTv;

use crate::error::DeviceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use utoipa::ToSchema;

pub type DeviceResult = Result<Value, DeviceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Light,
    Tv,
    Thermostat,
    Generic,
}

/// What a device looks like on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceInfo {
    pub device_id: String,
    pub name: String,
    pub device_type: DeviceType,
    pub state: Value,
}

/// A controllable device. Every capability defaults to `Unsupported`, so an
/// implementation only overrides what the hardware can do.
///
/// Optional arguments follow a query-or-set convention: `None` asks the
/// device for its current value instead of changing it.
pub trait Device: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str {
        self.id()
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Generic
    }

    fn state(&self) -> Value {
        Value::Null
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            device_id: self.id().to_string(),
            name: self.name().to_string(),
            device_type: self.device_type(),
            state: self.state(),
        }
    }

    // power
    fn turn_on(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("turn_on"))
    }

    fn turn_off(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("turn_off"))
    }

    fn sleep(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("sleep"))
    }

    fn wakeup(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("wakeup"))
    }

    fn reboot(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("reboot"))
    }

    fn power_state(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("power_state"))
    }

    // volume
    fn get_volume(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("get_volume"))
    }

    fn set_volume(&self, _volume: Option<Value>) -> DeviceResult {
        Err(DeviceError::Unsupported("set_volume"))
    }

    /// `steps` defaults to 1; negative steps are an `InvalidArgument`.
    fn volume_up(&self, _steps: Option<Value>) -> DeviceResult {
        Err(DeviceError::Unsupported("volume_up"))
    }

    fn volume_down(&self, _steps: Option<Value>) -> DeviceResult {
        Err(DeviceError::Unsupported("volume_down"))
    }

    fn mute(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("mute"))
    }

    fn unmute(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("unmute"))
    }

    // channel
    fn get_channel(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("get_channel"))
    }

    fn set_channel(&self, _channel: Option<Value>) -> DeviceResult {
        Err(DeviceError::Unsupported("set_channel"))
    }

    fn channel_up(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("channel_up"))
    }

    fn channel_down(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("channel_down"))
    }

    fn change_input(&self, _selected_input: Option<Value>) -> DeviceResult {
        Err(DeviceError::Unsupported("change_input"))
    }

    fn send_command(&self, _command: Value) -> DeviceResult {
        Err(DeviceError::Unsupported("send_command"))
    }

    // apps
    fn get_apps(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("get_apps"))
    }

    fn get_active_app(&self) -> DeviceResult {
        Err(DeviceError::Unsupported("get_active_app"))
    }

    fn set_app(&self, _app: Option<Value>) -> DeviceResult {
        Err(DeviceError::Unsupported("set_app"))
    }

    // temperature
    fn get_temp(&self, _area: Option<Value>) -> DeviceResult {
        Err(DeviceError::Unsupported("get_temp"))
    }

    fn set_temp(&self, _temperature: Option<Value>) -> DeviceResult {
        Err(DeviceError::Unsupported("set_temp"))
    }

    /// `steps` defaults to 1; negative steps are an `InvalidArgument`.
    fn temp_up(&self, _steps: Option<Value>) -> DeviceResult {
        Err(DeviceError::Unsupported("temp_up"))
    }

    fn temp_down(&self, _steps: Option<Value>) -> DeviceResult {
        Err(DeviceError::Unsupported("temp_down"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    On,
    Off,
    Sleep,
}

impl PowerState {
    pub fn as_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// Device state locks are never held across a panic that could leave the
// state half-written, so a poisoned lock is still usable.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Step count for up/down capabilities; absent means one step.
fn steps(steps: Option<&Value>) -> Result<i64, DeviceError> {
    match steps {
        None => Ok(1),
        Some(value) => value
            .as_i64()
            .filter(|steps| *steps >= 0)
            .ok_or_else(|| DeviceError::InvalidArgument(format!("steps: {value}"))),
    }
}

fn integer(name: &str, value: &Value) -> Result<i64, DeviceError> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| DeviceError::InvalidArgument(format!("{name}: {value}")))
}

fn number(name: &str, value: &Value) -> Result<f64, DeviceError> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| DeviceError::InvalidArgument(format!("{name}: {value}")))
}

fn text(name: &str, value: &Value) -> Result<String, DeviceError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DeviceError::InvalidArgument(format!("{name}: {value}")))
}
