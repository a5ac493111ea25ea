// virtual_thermostat.rs
use super::{Device, DeviceFactory, DeviceResult, DeviceType, PowerState, number, read, text, write};
use crate::{config::DeviceConfig, error::DeviceError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

const MIN_TEMP: f64 = 5.0;
const MAX_TEMP: f64 = 35.0;
const TEMP_STEP: f64 = 0.5;

#[derive(Debug, Clone, Serialize)]
struct ThermostatState {
    power: PowerState,
    target: f64,
    areas: BTreeMap<String, f64>,
    updated_at: DateTime<Utc>,
}

/// Heating controller with a single set point and a reading per area.
pub struct VirtualThermostat {
    id: String,
    name: String,
    state: RwLock<ThermostatState>,
}

impl VirtualThermostat {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        target: f64,
        areas: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: RwLock::new(ThermostatState {
                power: PowerState::Off,
                target: target.clamp(MIN_TEMP, MAX_TEMP),
                areas,
                updated_at: Utc::now(),
            }),
        }
    }

    /// Updates the measured temperature of an area.
    pub fn record_reading(&self, area: impl Into<String>, celsius: f64) {
        let mut state = write(&self.state);
        state.areas.insert(area.into(), celsius);
        state.updated_at = Utc::now();
    }

    fn set_power(&self, power: PowerState) -> DeviceResult {
        let mut state = write(&self.state);
        state.power = power;
        state.updated_at = Utc::now();
        Ok(power.as_value())
    }

    fn shift_target(&self, steps: Option<Value>, sign: f64) -> DeviceResult {
        let steps = super::steps(steps.as_ref())? as f64;
        let mut state = write(&self.state);
        state.target = (state.target + sign * steps * TEMP_STEP).clamp(MIN_TEMP, MAX_TEMP);
        state.updated_at = Utc::now();
        Ok(json!(state.target))
    }
}

impl Device for VirtualThermostat {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Thermostat
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

    fn get_temp(&self, area: Option<Value>) -> DeviceResult {
        let state = read(&self.state);
        let Some(area) = area else {
            return Ok(json!(state.target));
        };

        let area = text("area", &area)?;
        state
            .areas
            .get(&area)
            .map(|celsius| json!(celsius))
            .ok_or_else(|| DeviceError::InvalidArgument(format!("unknown area: {area}")))
    }

    fn set_temp(&self, temperature: Option<Value>) -> DeviceResult {
        let Some(temperature) = temperature else {
            return self.get_temp(None);
        };
        let temperature = number("temperature", &temperature)?;
        if !(MIN_TEMP..=MAX_TEMP).contains(&temperature) {
            return Err(DeviceError::InvalidArgument(format!(
                "temperature out of range: {temperature}"
            )));
        }

        let mut state = write(&self.state);
        state.target = temperature;
        state.updated_at = Utc::now();
        Ok(json!(temperature))
    }

    fn temp_up(&self, steps: Option<Value>) -> DeviceResult {
        self.shift_target(steps, 1.0)
    }

    fn temp_down(&self, steps: Option<Value>) -> DeviceResult {
        self.shift_target(steps, -1.0)
    }
}

pub struct VirtualThermostatFactory;

impl DeviceFactory for VirtualThermostatFactory {
    fn driver(&self) -> &'static str {
        "virtual_thermostat"
    }

    fn create(&self, config: &DeviceConfig) -> anyhow::Result<Arc<dyn Device>> {
        let target = match config.options.get("target") {
            Some(value) => number("target", value)?,
            None => 21.0,
        };
        let areas = match config.options.get("areas") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => BTreeMap::new(),
        };

        Ok(Arc::new(VirtualThermostat::new(
            &config.id,
            config.display_name(),
            target,
            areas,
        )))
    }
}

inventory::submit! {
    &VirtualThermostatFactory as &'static dyn DeviceFactory
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thermostat() -> VirtualThermostat {
        let mut areas = BTreeMap::new();
        areas.insert("kitchen".to_string(), 19.5);
        VirtualThermostat::new("heat1", "Heating", 21.0, areas)
    }

    #[test]
    fn test_get_temp_by_area() {
        let thermostat = thermostat();

        assert_eq!(thermostat.get_temp(None), Ok(json!(21.0)));
        assert_eq!(thermostat.get_temp(Some(json!("kitchen"))), Ok(json!(19.5)));
        assert!(thermostat.get_temp(Some(json!("attic"))).is_err());

        thermostat.record_reading("attic", 15.0);
        assert_eq!(thermostat.get_temp(Some(json!("attic"))), Ok(json!(15.0)));
    }

    #[test]
    fn test_set_temp_without_value_reports_target() {
        let thermostat = thermostat();

        assert_eq!(thermostat.set_temp(None), Ok(json!(21.0)));
        assert_eq!(thermostat.set_temp(Some(json!(23.5))), Ok(json!(23.5)));
        assert_eq!(thermostat.set_temp(None), Ok(json!(23.5)));
        assert!(thermostat.set_temp(Some(json!(80))).is_err());
    }

    #[test]
    fn test_steps_are_half_degrees() {
        let thermostat = thermostat();

        assert_eq!(thermostat.temp_up(None), Ok(json!(21.5)));
        assert_eq!(thermostat.temp_down(Some(json!(3))), Ok(json!(20.0)));
        assert_eq!(thermostat.temp_up(Some(json!(100))), Ok(json!(35.0)));
    }
}
