// ── Discovery payloads ──
//
// Retained config messages announcing each device as one climate entity
// plus temperature, humidity and energy sensors. Every config topic is
// cleared with a retained `{}` first so stale entities from an earlier
// run are dropped.

use serde_json::{Value, json};
use strum::IntoEnumIterator;

use crate::model::DeviceProfile;
use crate::topics::{SensorKind, Setting, StateTopic, TopicScheme};

/// Payload that removes a retained discovery entry.
pub const CLEAR_PAYLOAD: &str = "{}";

pub const MODES: [&str; 6] = ["auto", "off", "cool", "dry", "fan_only", "heat"];
pub const PRESET_MODES: [&str; 6] = [
    "sleep",
    "Quiet",
    "Smart",
    "boost",
    "Wind Free",
    "Wind Free Sleep",
];
pub const FAN_MODES: [&str; 5] = ["auto", "low", "medium", "high", "Turbo"];
pub const SWING_MODES: [&str; 2] = ["on", "off"];

/// Identity fields shared by every entity of one device.
pub struct Announcer<'a> {
    pub topics: &'a TopicScheme,
    pub app_version: &'a str,
}

impl Announcer<'_> {
    /// Every discovery config topic owned by a device.
    pub fn config_topics(&self, device_id: &str) -> Vec<String> {
        std::iter::once(self.topics.climate_config(device_id))
            .chain(SensorKind::iter().map(|kind| self.topics.sensor_config(device_id, kind)))
            .collect()
    }

    /// `(topic, payload)` pairs that announce `profile`.
    pub fn messages(&self, profile: &DeviceProfile) -> Vec<(String, String)> {
        let id = profile.device_id.as_str();
        let mut out = vec![(self.topics.climate_config(id), self.climate(profile).to_string())];
        out.extend(SensorKind::iter().map(|kind| {
            (
                self.topics.sensor_config(id, kind),
                self.sensor(profile, kind).to_string(),
            )
        }));
        out
    }

    fn device_block(&self, profile: &DeviceProfile) -> Value {
        let mut block = json!({
            "name": profile.name,
            "model": profile.model,
            "manufacturer": profile.manufacturer,
            "via_device": self.topics.app_name(),
            "identifiers": [profile.serial_number.as_deref().unwrap_or(&profile.device_id)],
        });
        if let (Some(area), Some(map)) = (&profile.area, block.as_object_mut()) {
            map.insert("suggested_area".into(), json!(area));
        }
        block
    }

    fn climate(&self, profile: &DeviceProfile) -> Value {
        let id = profile.device_id.as_str();
        let state = |topic| self.topics.state(id, topic);
        let command = |setting| self.topics.command(id, setting);

        let mut payload = json!({
            "name": profile.name,
            "unique_id": id,
            "sw_version": self.app_version,
            "mode_command_topic": command(Setting::Mode),
            "mode_state_topic": state(StateTopic::Mode),
            "action_topic": state(StateTopic::Action),
            "current_humidity_topic": state(StateTopic::Humidity),
            "current_temperature_topic": state(StateTopic::Temperature),
            "fan_mode_command_topic": command(Setting::Fan),
            "fan_mode_state_topic": state(StateTopic::Fan),
            "preset_mode_command_topic": command(Setting::Preset),
            "preset_mode_state_topic": state(StateTopic::Preset),
            "swing_mode_command_topic": command(Setting::SwingMode),
            "swing_mode_state_topic": state(StateTopic::SwingMode),
            "temperature_command_topic": command(Setting::TargetTemperature),
            "temperature_state_topic": state(StateTopic::TargetTemperature),
            "precision": 1.0,
            "temp_step": 1.0,
            "optimistic": false,
            "temperature_unit": profile.temperature_unit,
            "modes": MODES,
            "preset_modes": PRESET_MODES,
            "fan_modes": FAN_MODES,
            "swing_modes": SWING_MODES,
            "device": self.device_block(profile),
        });
        if let Some(map) = payload.as_object_mut() {
            if let Some(min) = profile.min_setpoint {
                map.insert("min_temp".into(), json!(min));
            }
            if let Some(max) = profile.max_setpoint {
                map.insert("max_temp".into(), json!(max));
            }
        }
        payload
    }

    fn sensor(&self, profile: &DeviceProfile, kind: SensorKind) -> Value {
        let (name, state_topic, state_class, unit) = match kind {
            SensorKind::Temperature => (
                "Temperature",
                StateTopic::Temperature,
                "measurement",
                format!("°{}", profile.temperature_unit),
            ),
            SensorKind::Humidity => (
                "Humidity",
                StateTopic::Humidity,
                "measurement",
                "%".to_owned(),
            ),
            SensorKind::Energy => (
                "Total Energy",
                StateTopic::EnergyUsed,
                "total_increasing",
                "Wh".to_owned(),
            ),
        };

        json!({
            "name": name,
            "unique_id": format!("{}_{}", profile.device_id, kind.as_ref()),
            "sw_version": self.app_version,
            "device_class": kind.as_ref(),
            "state_class": state_class,
            "suggested_display_precision": 0,
            "unit_of_measurement": unit,
            "state_topic": self.topics.state(&profile.device_id, state_topic),
            "device": self.device_block(profile),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn profile() -> DeviceProfile {
        DeviceProfile {
            device_id: "dev-1".into(),
            driver: "samsung-room-ac",
            name: "Bedroom AC".into(),
            area: Some("Bedroom".into()),
            manufacturer: "Samsung",
            model: "Geo Plus",
            serial_number: Some("SN123".into()),
            temperature_unit: "C".into(),
            min_setpoint: Some(16.0),
            max_setpoint: Some(30.0),
        }
    }

    #[test]
    fn announces_climate_and_three_sensors() {
        let topics = TopicScheme::new("stac2mqtt", "homeassistant");
        let announcer = Announcer {
            topics: &topics,
            app_version: "1.2.3",
        };
        let messages = announcer.messages(&profile());

        let published: Vec<&str> = messages.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            published,
            vec![
                "homeassistant/climate/dev-1/config",
                "homeassistant/sensor/dev-1_temperature/config",
                "homeassistant/sensor/dev-1_humidity/config",
                "homeassistant/sensor/dev-1_energy/config",
            ]
        );
        assert_eq!(announcer.config_topics("dev-1"), published);

        let climate: Value = serde_json::from_str(&messages[0].1).expect("json");
        assert_eq!(climate["mode_command_topic"], "stac2mqtt/hvac/dev-1/mode/set");
        assert_eq!(climate["temperature_state_topic"], "stac2mqtt/hvac/dev-1/target_temperature");
        assert_eq!(climate["min_temp"], 16.0);
        assert_eq!(climate["device"]["identifiers"], json!(["SN123"]));
        assert_eq!(climate["device"]["via_device"], "stac2mqtt");
        assert_eq!(climate["device"]["suggested_area"], "Bedroom");

        let temperature: Value = serde_json::from_str(&messages[1].1).expect("json");
        assert_eq!(temperature["unit_of_measurement"], "°C");
        assert_eq!(temperature["unique_id"], "dev-1_temperature");
        assert_eq!(temperature["state_topic"], "stac2mqtt/hvac/dev-1/temperature");
    }

    #[test]
    fn missing_serial_falls_back_to_device_id() {
        let topics = TopicScheme::new("app", "ha");
        let announcer = Announcer {
            topics: &topics,
            app_version: "0",
        };
        let mut profile = profile();
        profile.serial_number = None;
        profile.min_setpoint = None;

        let climate: Value =
            serde_json::from_str(&announcer.messages(&profile)[0].1).expect("json");
        assert_eq!(climate["device"]["identifiers"], json!(["dev-1"]));
        assert!(climate.get("min_temp").is_none());
    }
}
