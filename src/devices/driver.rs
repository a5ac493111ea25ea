// devices/driver.rs
use super::Device;
use crate::config::DeviceConfig;
use std::sync::Arc;

/// Builds devices of one driver kind from config. Implementations register
/// themselves with `inventory::submit!`.
pub trait DeviceFactory: Sync {
    fn driver(&self) -> &'static str;
    fn create(&self, config: &DeviceConfig) -> anyhow::Result<Arc<dyn Device>>;
}

inventory::collect!(&'static dyn DeviceFactory);

pub fn build_device(config: &DeviceConfig) -> anyhow::Result<Arc<dyn Device>> {
    let factory = inventory::iter::<&'static dyn DeviceFactory>
        .into_iter()
        .find(|factory| factory.driver() == config.driver)
        .ok_or_else(|| anyhow::anyhow!("Unknown driver {} for device {}", config.driver, config.id))?;

    factory.create(config)
}

pub fn drivers() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = inventory::iter::<&'static dyn DeviceFactory>
        .into_iter()
        .map(|factory| factory.driver())
        .collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DeviceType;
    use serde_json::json;

    fn device_config(driver: &str) -> DeviceConfig {
        DeviceConfig {
            id: "dev1".to_string(),
            name: Some("Living room".to_string()),
            driver: driver.to_string(),
            options: json!({}),
        }
    }

    #[test]
    fn test_builtin_drivers_are_registered() {
        assert_eq!(
            drivers(),
            vec!["virtual_light", "virtual_thermostat", "virtual_tv"]
        );
    }

    #[test]
    fn test_build_device() {
        let device = build_device(&device_config("virtual_tv")).unwrap();

        assert_eq!(device.id(), "dev1");
        assert_eq!(device.name(), "Living room");
        assert_eq!(device.device_type(), DeviceType::Tv);
    }

    #[test]
    fn test_unknown_driver() {
        let err = build_device(&device_config("zigbee")).err().unwrap();

        assert_eq!(err.to_string(), "Unknown driver zigbee for device dev1");
    }
}
