// ── Driver registry ──
//
// A driver is a signature predicate over the first status snapshot plus a
// profile constructor. The registry is a fixed table searched in order.

use stbridge_api::Snapshot;

use crate::config::DeviceConfig;
use crate::model::DeviceProfile;

/// One supported device family.
#[derive(Debug, Clone, Copy)]
pub struct DriverEntry {
    pub name: &'static str,
    pub matches: fn(&Snapshot) -> bool,
    pub build: fn(&DeviceConfig, &Snapshot) -> DeviceProfile,
}

/// Drivers shipped with the bridge.
pub static BUILTIN: &[DriverEntry] = &[SAMSUNG_ROOM_AC];

/// Ordered set of drivers consulted at registration.
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    entries: Vec<DriverEntry>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DriverRegistry {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN.to_vec(),
        }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a driver after the existing ones.
    pub fn with(mut self, entry: DriverEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// First driver whose signature matches `snapshot`.
    pub fn resolve(&self, snapshot: &Snapshot) -> Option<&DriverEntry> {
        self.entries.iter().find(|entry| (entry.matches)(snapshot))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.name)
    }
}

// ── Samsung room air conditioner ─────────────────────────────────────

const DA_PAYLOAD: [&str; 4] = ["execute", "data", "value", "payload"];

pub const SAMSUNG_ROOM_AC: DriverEntry = DriverEntry {
    name: "samsung-room-ac",
    matches: samsung_room_ac_matches,
    build: samsung_room_ac_profile,
};

fn da_field<'a>(snapshot: &'a Snapshot, key: &str) -> Option<&'a str> {
    let [a, b, c, d] = DA_PAYLOAD;
    snapshot.str(&[a, b, c, d, key])
}

fn samsung_room_ac_matches(snapshot: &Snapshot) -> bool {
    snapshot.attribute_str("ocf", "n") == Some("Samsung-Room-Air-Conditioner")
        && da_field(snapshot, "x.com.samsung.da.description") == Some("ARA-WW-TP1-22-COMMON")
}

fn samsung_room_ac_profile(device: &DeviceConfig, snapshot: &Snapshot) -> DeviceProfile {
    let setpoint = |attribute| {
        snapshot.attribute_f64("custom.thermostatSetpointControl", attribute)
    };

    DeviceProfile {
        device_id: device.device_id.clone(),
        driver: SAMSUNG_ROOM_AC.name,
        name: device
            .name
            .clone()
            .unwrap_or_else(|| device.device_id.clone()),
        area: device.area.clone(),
        manufacturer: "Samsung",
        model: "Geo Plus",
        serial_number: da_field(snapshot, "x.com.samsung.da.serialNum").map(str::to_owned),
        temperature_unit: snapshot
            .attribute_unit("temperatureMeasurement", "temperature")
            .unwrap_or("C")
            .to_owned(),
        min_setpoint: setpoint("minimumSetpoint"),
        max_setpoint: setpoint("maximumSetpoint"),
    }
}
