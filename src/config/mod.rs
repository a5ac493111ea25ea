// config/mod.rs
use crate::error::AppError;
use config::Config;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub server: ServerSettings,
    #[validate(nested)]
    pub metrics: MetricsSettings,
    #[validate(nested)]
    pub bus: BusSettings,
    #[validate(nested)]
    pub dispatcher: DispatcherSettings,
    #[serde(default)]
    #[validate(nested)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerSettings {
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(range(min = 1, max = 60000))]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MetricsSettings {
    pub enabled: bool,
    #[validate(range(min = 1))]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BusSettings {
    #[validate(range(min = 1))]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DispatcherSettings {
    /// Prepended to every route, e.g. `ovos.iot` + `device.turn_on`.
    pub topic_prefix: String,
    /// Log a warning when a request names a device that is not registered.
    pub warn_unknown_device: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            topic_prefix: "ovos.iot".to_string(),
            warn_unknown_device: false,
        }
    }
}

/// A device the binary registers at startup.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeviceConfig {
    #[validate(length(min = 1))]
    pub id: String,
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub driver: String,
    #[serde(default)]
    pub options: Value,
}

impl DeviceConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl Settings {
    /// Layers, lowest first: built-in defaults, `config/config.*` if present,
    /// then `APP__SECTION__KEY` environment variables.
    pub fn new() -> Result<Self, AppError> {
        Self::from_builder(
            Config::builder()
                .add_source(config::File::with_name("config/config").required(false))
                .add_source(config::Environment::with_prefix("APP").separator("__")),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, AppError> {
        let settings: Settings = builder
            .set_default("server.address", "0.0.0.0:8181")?
            .set_default("server.request_timeout_ms", 5000_i64)?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.port", 9000_i64)?
            .set_default("bus.capacity", 256_i64)?
            .set_default("dispatcher.topic_prefix", "ovos.iot")?
            .set_default("dispatcher.warn_unknown_device", false)?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }
}
