// ── Topic scheme ──
//
// State:     {app}/hvac/{device_id}/{field}
// Command:   {app}/hvac/{device_id}/{field}/set
// Discovery: {prefix}/climate/{device_id}/config
//            {prefix}/sensor/{device_id}_{kind}/config

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Published state fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum StateTopic {
    Mode,
    Action,
    Humidity,
    Temperature,
    TargetTemperature,
    Fan,
    Preset,
    SwingMode,
    Autocleaning,
    EnergyUsed,
}

/// Writable settings, each with a `/set` command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Setting {
    Mode,
    Fan,
    Preset,
    SwingMode,
    TargetTemperature,
    Autocleaning,
}

/// Sensor entities announced next to the climate entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Humidity,
    Energy,
}

/// Builds every topic string the bridge uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    app_name: String,
    discovery_prefix: String,
}

impl TopicScheme {
    pub fn new(app_name: impl Into<String>, discovery_prefix: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            discovery_prefix: discovery_prefix.into(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// `{app}/hvac/{device_id}`, the prefix of every state and command topic.
    pub fn device_root(&self, device_id: &str) -> String {
        format!("{}/hvac/{device_id}", self.app_name)
    }

    pub fn state(&self, device_id: &str, topic: StateTopic) -> String {
        format!("{}/{}", self.device_root(device_id), topic.as_ref())
    }

    pub fn command(&self, device_id: &str, setting: Setting) -> String {
        format!("{}/{}/set", self.device_root(device_id), setting.as_ref())
    }

    /// Parse a command topic back into `(device_id, setting)`.
    pub fn parse_command(&self, topic: &str) -> Option<(String, Setting)> {
        let rest = topic
            .strip_prefix(self.app_name.as_str())?
            .strip_prefix("/hvac/")?
            .strip_suffix("/set")?;
        let (device_id, field) = rest.rsplit_once('/')?;
        if device_id.is_empty() || device_id.contains('/') {
            return None;
        }
        let setting = field.parse().ok()?;
        Some((device_id.to_owned(), setting))
    }

    pub fn climate_config(&self, device_id: &str) -> String {
        format!("{}/climate/{device_id}/config", self.discovery_prefix)
    }

    pub fn sensor_config(&self, device_id: &str, kind: SensorKind) -> String {
        format!(
            "{}/sensor/{device_id}_{}/config",
            self.discovery_prefix,
            kind.as_ref()
        )
    }
}
