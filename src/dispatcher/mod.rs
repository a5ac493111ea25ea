// dispatcher/mod.rs
//! Bridges bus topics to device capabilities.
//!
//! Every route in [`commands::ROUTES`] is subscribed on `start` and removed
//! on `shutdown`. A request either produces exactly one reply or is dropped
//! with a reason; the reason is logged and counted but never sent back.

use crate::commands::{self, Action, DEVICE_ID, Route};
use crate::config::DispatcherSettings;
use crate::error::DispatchError;
use crate::events::{Bus, Message, SubscriptionId};
use crate::metrics;
use crate::registry::Registry;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, error, info, warn};

pub struct Dispatcher {
    bus: Arc<dyn Bus>,
    inner: Arc<Inner>,
    subscriptions: Mutex<Vec<(String, SubscriptionId)>>,
}

struct Inner {
    registry: Arc<Registry>,
    // Handlers live inside the bus, so they must not keep it alive.
    bus: Weak<dyn Bus>,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(bus: Arc<dyn Bus>, registry: Arc<Registry>, settings: DispatcherSettings) -> Self {
        let inner = Arc::new(Inner {
            registry,
            bus: Arc::downgrade(&bus),
            settings,
        });

        Self {
            bus,
            inner,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Subscribes every route. Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !subscriptions.is_empty() {
            warn!("Dispatcher already started");
            return;
        }

        for route in commands::ROUTES {
            let topic = route.topic(&self.inner.settings.topic_prefix);
            let inner = Arc::clone(&self.inner);
            let id = self.bus.on(
                &topic,
                Arc::new(move |message: &Message| inner.on_message(route, message)),
            );
            subscriptions.push((topic, id));
        }

        info!(
            topics = subscriptions.len(),
            prefix = %self.inner.settings.topic_prefix,
            "Dispatcher started"
        );
    }

    /// Removes exactly the subscriptions made by `start`. Returns how many
    /// were removed.
    pub fn shutdown(&self) -> usize {
        let subscriptions: Vec<(String, SubscriptionId)> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let mut removed = 0;
        for (topic, id) in &subscriptions {
            if self.bus.remove(topic, *id) {
                removed += 1;
            } else {
                warn!(%topic, "Subscription already gone");
            }
        }

        info!(removed, "Dispatcher stopped");
        removed
    }

    pub fn is_running(&self) -> bool {
        !self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Topics currently subscribed, in route order.
    pub fn topics(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Handles `message` without going through the bus. `None` when its
    /// topic is not one of ours.
    pub fn handle(&self, message: &Message) -> Option<Result<Message, DispatchError>> {
        let route = self.inner.route_for(&message.msg_type)?;
        Some(self.inner.dispatch(route, message))
    }
}

impl Inner {
    fn route_for(&self, topic: &str) -> Option<&'static Route> {
        let prefix = &self.settings.topic_prefix;
        let suffix = if prefix.is_empty() {
            topic
        } else {
            topic.strip_prefix(prefix.as_str())?.strip_prefix('.')?
        };
        commands::find(suffix)
    }

    fn on_message(&self, route: &Route, message: &Message) {
        let result = self.dispatch(route, message);
        metrics::record_dispatch(route.suffix, outcome(&result));

        match result {
            Ok(reply) => match self.bus.upgrade() {
                Some(bus) => bus.emit(reply),
                None => warn!(topic = %message.msg_type, "Bus gone, reply dropped"),
            },
            Err(err) => self.report(message, &err),
        }
    }

    fn report(&self, message: &Message, err: &DispatchError) {
        let topic = &message.msg_type;
        match err {
            DispatchError::MissingDeviceId | DispatchError::MissingField(_) => {
                error!(%topic, "{err}");
            }
            DispatchError::UnknownDevice(device_id) => {
                if self.settings.warn_unknown_device {
                    warn!(%topic, %device_id, "Unknown device");
                }
            }
            DispatchError::Device(device_err) => {
                warn!(%topic, error = %device_err, "Device call failed");
            }
        }
    }

    fn dispatch(&self, route: &Route, message: &Message) -> Result<Message, DispatchError> {
        match route.action {
            Action::AllDevices => Ok(message.response(self.registry.to_json())),
            Action::OneDevice => {
                let info = message
                    .field(DEVICE_ID)
                    .and_then(Value::as_str)
                    .and_then(|device_id| self.registry.get(device_id))
                    .map(|device| device.info());
                Ok(message.response(serde_json::to_value(info).unwrap_or(Value::Null)))
            }
            Action::Capability { required, invoke } => {
                let device_id = message
                    .field(DEVICE_ID)
                    .ok_or(DispatchError::MissingDeviceId)?;

                if let Some(field) = required {
                    if message.field(field).is_none() {
                        return Err(DispatchError::MissingField(field));
                    }
                }

                // A non-string id can never match a registered device.
                let device = device_id
                    .as_str()
                    .and_then(|device_id| self.registry.get(device_id))
                    .ok_or_else(|| DispatchError::UnknownDevice(id_text(device_id)))?;

                debug!(topic = %message.msg_type, device_id = device.id(), "Dispatching");
                let result = invoke(device.as_ref(), message)?;
                Ok(message.response(result))
            }
        }
    }
}

fn id_text(device_id: &Value) -> String {
    match device_id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn outcome(result: &Result<Message, DispatchError>) -> &'static str {
    match result {
        Ok(_) => "replied",
        Err(DispatchError::MissingDeviceId) => "missing_device_id",
        Err(DispatchError::MissingField(_)) => "missing_field",
        Err(DispatchError::UnknownDevice(_)) => "unknown_device",
        Err(DispatchError::Device(_)) => "device_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Device, DeviceResult, VirtualTv};
    use crate::error::DeviceError;
    use crate::events::EventBus;
    use serde_json::json;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Collects the level of every event logged while installed.
    #[derive(Clone, Default)]
    struct Logs(Arc<Mutex<Vec<Level>>>);

    impl<S: Subscriber> Layer<S> for Logs {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    /// Emits `data` on the turn_on topic and returns the warnings and errors
    /// it produced.
    fn diagnostics(settings: DispatcherSettings, data: Value) -> Vec<Level> {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(Registry::new());
        registry.register(Arc::new(Probe::default()));
        let dispatcher = Dispatcher::new(bus.clone(), registry, settings);
        dispatcher.start();

        let logs = Logs::default();
        tracing::subscriber::with_default(tracing_subscriber::registry().with(logs.clone()), || {
            bus.emit(request("device.turn_on", data));
        });

        let levels = logs.0.lock().unwrap().clone();
        levels
            .into_iter()
            .filter(|level| *level == Level::WARN || *level == Level::ERROR)
            .collect()
    }

    /// Records the arguments each capability saw.
    #[derive(Default)]
    struct Probe {
        calls: Mutex<Vec<(String, Option<Value>)>>,
    }

    impl Probe {
        fn record(&self, capability: &str, arg: Option<Value>) -> DeviceResult {
            self.calls
                .lock()
                .unwrap()
                .push((capability.to_string(), arg.clone()));
            Ok(json!({ "capability": capability, "arg": arg }))
        }

        fn calls(&self) -> Vec<(String, Option<Value>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Device for Probe {
        fn id(&self) -> &str {
            "probe"
        }

        fn turn_on(&self) -> DeviceResult {
            self.record("turn_on", None)
        }

        fn set_volume(&self, volume: Option<Value>) -> DeviceResult {
            self.record("set_volume", volume)
        }

        fn set_channel(&self, channel: Option<Value>) -> DeviceResult {
            self.record("set_channel", channel)
        }

        fn set_app(&self, app: Option<Value>) -> DeviceResult {
            self.record("set_app", app)
        }

        fn set_temp(&self, temperature: Option<Value>) -> DeviceResult {
            self.record("set_temp", temperature)
        }

        fn get_temp(&self, area: Option<Value>) -> DeviceResult {
            self.record("get_temp", area)
        }

        fn send_command(&self, command: Value) -> DeviceResult {
            self.record("send_command", Some(command))
        }
    }

    fn dispatcher_with(device: Arc<dyn Device>) -> Dispatcher {
        let registry = Arc::new(Registry::new());
        registry.register(device);
        Dispatcher::new(
            Arc::new(EventBus::new()),
            registry,
            DispatcherSettings::default(),
        )
    }

    fn request(suffix: &str, data: Value) -> Message {
        Message::new(format!("ovos.iot.{suffix}"), data)
    }

    #[test]
    fn test_missing_device_id() {
        let dispatcher = dispatcher_with(Arc::new(Probe::default()));

        for suffix in ["device.turn_on", "device.set.volume", "device.temp.up"] {
            let result = dispatcher.handle(&request(suffix, json!({}))).unwrap();
            assert_eq!(result, Err(DispatchError::MissingDeviceId));
        }

        let result = dispatcher
            .handle(&request("device.turn_on", json!({"device_id": null})))
            .unwrap();
        assert_eq!(result, Err(DispatchError::MissingDeviceId));
    }

    #[test]
    fn test_unknown_device() {
        let dispatcher = dispatcher_with(Arc::new(Probe::default()));

        let result = dispatcher
            .handle(&request("device.turn_on", json!({"device_id": "nope"})))
            .unwrap();
        assert_eq!(result, Err(DispatchError::UnknownDevice("nope".to_string())));

        let result = dispatcher
            .handle(&request("device.turn_on", json!({"device_id": 7})))
            .unwrap();
        assert_eq!(result, Err(DispatchError::UnknownDevice("7".to_string())));
    }

    #[test]
    fn test_missing_device_id_logs_error() {
        let levels = diagnostics(DispatcherSettings::default(), json!({"volume": 3}));
        assert_eq!(levels, vec![Level::ERROR]);
    }

    #[test]
    fn test_unknown_device_is_silent_by_default() {
        let levels = diagnostics(DispatcherSettings::default(), json!({"device_id": "nope"}));
        assert!(levels.is_empty());
    }

    #[test]
    fn test_unknown_device_warns_when_enabled() {
        let settings = DispatcherSettings {
            warn_unknown_device: true,
            ..DispatcherSettings::default()
        };

        let levels = diagnostics(settings, json!({"device_id": "nope"}));
        assert_eq!(levels, vec![Level::WARN]);
    }

    #[test]
    fn test_optional_values_pass_through_as_none() {
        let probe = Arc::new(Probe::default());
        let dispatcher = dispatcher_with(probe.clone());

        for suffix in [
            "device.set.volume",
            "device.set.channel",
            "device.set.temp",
            "device.set.active.app",
            "device.get.temp",
        ] {
            dispatcher
                .handle(&request(suffix, json!({"device_id": "probe"})))
                .unwrap()
                .unwrap();
        }

        assert_eq!(
            probe.calls(),
            vec![
                ("set_volume".to_string(), None),
                ("set_channel".to_string(), None),
                ("set_temp".to_string(), None),
                ("set_app".to_string(), None),
                ("get_temp".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_fields_pass_through_unchanged() {
        let probe = Arc::new(Probe::default());
        let dispatcher = dispatcher_with(probe.clone());

        dispatcher
            .handle(&request(
                "device.set.volume",
                json!({"device_id": "probe", "volume": "loud"}),
            ))
            .unwrap()
            .unwrap();
        dispatcher
            .handle(&request(
                "device.get.temp",
                json!({"device_id": "probe", "area": "kitchen"}),
            ))
            .unwrap()
            .unwrap();

        assert_eq!(
            probe.calls(),
            vec![
                ("set_volume".to_string(), Some(json!("loud"))),
                ("get_temp".to_string(), Some(json!("kitchen"))),
            ]
        );
    }

    #[test]
    fn test_send_command_requires_command() {
        let probe = Arc::new(Probe::default());
        let dispatcher = dispatcher_with(probe.clone());

        let result = dispatcher
            .handle(&request("device.send.command", json!({"device_id": "probe"})))
            .unwrap();
        assert_eq!(result, Err(DispatchError::MissingField("command")));

        let result = dispatcher
            .handle(&request("device.send.command", json!({"command": "reboot"})))
            .unwrap();
        assert_eq!(result, Err(DispatchError::MissingDeviceId));

        let reply = dispatcher
            .handle(&request(
                "device.send.command",
                json!({"device_id": "probe", "command": "input keyevent 3"}),
            ))
            .unwrap()
            .unwrap();
        assert_eq!(reply.msg_type, "ovos.iot.device.send.command.response");
        assert_eq!(
            reply.data,
            json!({"capability": "send_command", "arg": "input keyevent 3"})
        );
        assert_eq!(probe.calls().len(), 1);
    }

    #[test]
    fn test_unsupported_capability_is_dropped() {
        let dispatcher = dispatcher_with(Arc::new(Probe::default()));

        let result = dispatcher
            .handle(&request("device.mute", json!({"device_id": "probe"})))
            .unwrap();

        assert_eq!(
            result,
            Err(DispatchError::Device(DeviceError::Unsupported("mute")))
        );
    }

    #[test]
    fn test_get_device() {
        let dispatcher = dispatcher_with(Arc::new(VirtualTv::new("tv1", "TV")));

        let reply = dispatcher
            .handle(&request("get.device", json!({"device_id": "tv1"})))
            .unwrap()
            .unwrap();
        assert_eq!(reply.data["device_id"], json!("tv1"));
        assert_eq!(reply.data["device_type"], json!("tv"));

        for data in [json!({"device_id": "missing"}), json!({}), Value::Null] {
            let reply = dispatcher
                .handle(&request("get.device", data))
                .unwrap()
                .unwrap();
            assert_eq!(reply.data, Value::Null);
        }
    }

    #[test]
    fn test_get_devices_ignores_payload() {
        let dispatcher = dispatcher_with(Arc::new(VirtualTv::new("tv1", "TV")));

        for data in [json!({}), json!({"device_id": "other"}), json!("junk")] {
            let reply = dispatcher
                .handle(&request("get.devices", data))
                .unwrap()
                .unwrap();
            assert_eq!(reply.data, dispatcher.registry().to_json());
        }
    }

    #[test]
    fn test_foreign_topics_are_ignored() {
        let dispatcher = dispatcher_with(Arc::new(Probe::default()));

        assert!(dispatcher.handle(&Message::new("ovos.iot.call.function", json!({}))).is_none());
        assert!(dispatcher.handle(&Message::new("other.device.turn_on", json!({}))).is_none());
        assert!(dispatcher.handle(&Message::new("ovos.iotdevice.turn_on", json!({}))).is_none());
    }

    #[test]
    fn test_start_and_shutdown_are_symmetric() {
        let bus = Arc::new(EventBus::new());
        let dispatcher = Dispatcher::new(
            bus.clone(),
            Arc::new(Registry::new()),
            DispatcherSettings::default(),
        );
        let unrelated = bus.on("ovos.iot.device.turn_on", Arc::new(|_: &Message| {}));

        dispatcher.start();
        dispatcher.start();
        assert!(dispatcher.is_running());
        assert_eq!(dispatcher.topics().len(), commands::ROUTES.len());
        assert_eq!(bus.subscriber_count("ovos.iot.device.turn_on"), 2);
        assert_eq!(bus.subscriber_count("ovos.iot.get.devices"), 1);

        assert_eq!(dispatcher.shutdown(), commands::ROUTES.len());
        assert!(!dispatcher.is_running());
        assert_eq!(bus.topics(), vec!["ovos.iot.device.turn_on".to_string()]);
        assert!(bus.remove("ovos.iot.device.turn_on", unrelated));

        assert_eq!(dispatcher.shutdown(), 0);
    }
}
