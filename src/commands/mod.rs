// commands/mod.rs
use crate::devices::{Device, DeviceResult};
use crate::events::Message;
use serde_json::Value;

pub const DEVICE_ID: &str = "device_id";

/// Calls one capability with the fields it takes from the request payload.
pub type Invoke = fn(&dyn Device, &Message) -> DeviceResult;

#[derive(Clone, Copy)]
pub enum Action {
    /// Replies with the whole registry; needs no device id.
    AllDevices,
    /// Replies with one device, or null when the id is absent or unknown.
    OneDevice,
    /// Looks up `device_id` and calls a capability. `required` names a
    /// payload field that must be present besides the device id.
    Capability {
        required: Option<&'static str>,
        invoke: Invoke,
    },
}

#[derive(Clone, Copy)]
pub struct Route {
    pub suffix: &'static str,
    pub action: Action,
}

impl Route {
    pub fn topic(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            self.suffix.to_string()
        } else {
            format!("{prefix}.{}", self.suffix)
        }
    }
}

const fn capability(suffix: &'static str, invoke: Invoke) -> Route {
    Route {
        suffix,
        action: Action::Capability {
            required: None,
            invoke,
        },
    }
}

const fn capability_requiring(suffix: &'static str, field: &'static str, invoke: Invoke) -> Route {
    Route {
        suffix,
        action: Action::Capability {
            required: Some(field),
            invoke,
        },
    }
}

// Absent and null fields both reach the device as `None`.
fn arg(message: &Message, name: &str) -> Option<Value> {
    message.field(name).cloned()
}

pub static ROUTES: &[Route] = &[
    Route {
        suffix: "get.devices",
        action: Action::AllDevices,
    },
    Route {
        suffix: "get.device",
        action: Action::OneDevice,
    },
    // power
    capability("device.turn_on", |device, _| device.turn_on()),
    capability("device.turn_off", |device, _| device.turn_off()),
    capability("device.sleep", |device, _| device.sleep()),
    capability("device.wakeup", |device, _| device.wakeup()),
    capability("device.reboot", |device, _| device.reboot()),
    capability("device.get.power.state", |device, _| device.power_state()),
    // volume
    capability("device.get.volume", |device, _| device.get_volume()),
    capability("device.set.volume", |device, message| {
        device.set_volume(arg(message, "volume"))
    }),
    capability("device.volume.up", |device, message| {
        device.volume_up(arg(message, "steps"))
    }),
    capability("device.volume.down", |device, message| {
        device.volume_down(arg(message, "steps"))
    }),
    capability("device.mute", |device, _| device.mute()),
    capability("device.unmute", |device, _| device.unmute()),
    // channel and input
    capability("device.get.channel", |device, _| device.get_channel()),
    capability("device.set.channel", |device, message| {
        device.set_channel(arg(message, "channel"))
    }),
    capability("device.channel.up", |device, _| device.channel_up()),
    capability("device.channel.down", |device, _| device.channel_down()),
    capability("device.change.input", |device, message| {
        device.change_input(arg(message, "selected_input"))
    }),
    capability_requiring("device.send.command", "command", |device, message| {
        device.send_command(arg(message, "command").unwrap_or(Value::Null))
    }),
    // apps
    capability("device.get.apps", |device, _| device.get_apps()),
    capability("device.get.active.app", |device, _| device.get_active_app()),
    capability("device.set.active.app", |device, message| {
        device.set_app(arg(message, "app"))
    }),
    // temperature
    capability("device.get.temp", |device, message| {
        device.get_temp(arg(message, "area"))
    }),
    capability("device.set.temp", |device, message| {
        device.set_temp(arg(message, "temperature"))
    }),
    capability("device.temp.up", |device, message| {
        device.temp_up(arg(message, "steps"))
    }),
    capability("device.temp.down", |device, message| {
        device.temp_down(arg(message, "steps"))
    }),
];

pub fn find(suffix: &str) -> Option<&'static Route> {
    ROUTES.iter().find(|route| route.suffix == suffix)
}
