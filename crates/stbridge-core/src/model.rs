// ── Domain model ──

use crate::topics::StateTopic;

/// Normalized, topic-ready view of one status snapshot.
///
/// `mode` and `action` are always present. Everything else is published
/// only when the snapshot carried it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanonicalFields {
    pub mode: String,
    pub action: String,
    pub preset: Option<String>,
    pub fan_mode: Option<String>,
    pub swing_mode: Option<String>,
    pub temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub auto_cleaning: Option<String>,
    pub energy_wh: Option<f64>,
}

impl CanonicalFields {
    /// `(topic, payload)` pairs for every field that has a value.
    pub fn entries(&self) -> Vec<(StateTopic, String)> {
        let mut out = vec![
            (StateTopic::Mode, self.mode.clone()),
            (StateTopic::Action, self.action.clone()),
        ];
        let text = [
            (StateTopic::Preset, &self.preset),
            (StateTopic::Fan, &self.fan_mode),
            (StateTopic::SwingMode, &self.swing_mode),
            (StateTopic::Autocleaning, &self.auto_cleaning),
        ];
        out.extend(
            text.into_iter()
                .filter_map(|(topic, value)| Some((topic, value.clone()?))),
        );
        let numbers = [
            (StateTopic::Temperature, self.temperature),
            (StateTopic::TargetTemperature, self.target_temperature),
            (StateTopic::Humidity, self.humidity),
            (StateTopic::EnergyUsed, self.energy_wh),
        ];
        out.extend(
            numbers
                .into_iter()
                .filter_map(|(topic, value)| Some((topic, format_number(value?)))),
        );
        out
    }
}

/// `f64`'s `Display` already drops the `.0` on whole numbers.
pub(crate) fn format_number(value: f64) -> String {
    value.to_string()
}

/// Static facts about a device, read once at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub device_id: String,
    /// Registry name of the driver that matched.
    pub driver: &'static str,
    pub name: String,
    pub area: Option<String>,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub serial_number: Option<String>,
    /// `C` or `F`, as reported by the temperature capability.
    pub temperature_unit: String,
    pub min_setpoint: Option<f64>,
    pub max_setpoint: Option<f64>,
}

/// Observable state of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Waiting out the settle delay after registration.
    Settling,
    Idle,
    /// A status read is in flight.
    Refreshing,
    /// A command batch is in flight.
    Dispatching,
    /// The session loop has exited.
    Stopped,
}
