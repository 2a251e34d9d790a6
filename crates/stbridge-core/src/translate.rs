// ── Capability translation ──
//
// Vendor attribute tree -> canonical fields, and canonical command payloads
// -> vendor command batches. Pure functions; no I/O.
//
// Values missing from a table pass through unchanged in both directions,
// so new vendor values show up as-is instead of being dropped.

use stbridge_api::{Command, CommandBatch, Snapshot};

use crate::error::CoreError;
use crate::model::CanonicalFields;
use crate::topics::Setting;

// ── Value tables ─────────────────────────────────────────────────────

/// Bidirectional vendor <-> canonical value table.
#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    /// `(vendor, canonical)` pairs.
    pub pairs: &'static [(&'static str, &'static str)],
}

impl Table {
    pub fn to_canonical<'a>(&self, vendor: &'a str) -> &'a str {
        self.pairs
            .iter()
            .find(|(v, _)| *v == vendor)
            .map_or(vendor, |&(_, c)| c)
    }

    pub fn to_vendor<'a>(&self, canonical: &'a str) -> &'a str {
        self.pairs
            .iter()
            .find(|(_, c)| *c == canonical)
            .map_or(canonical, |&(v, _)| v)
    }
}

pub const MODE: Table = Table {
    name: "mode",
    pairs: &[("wind", "fan_only")],
};

pub const FAN: Table = Table {
    name: "fan",
    pairs: &[("turbo", "Turbo")],
};

pub const PRESET: Table = Table {
    name: "preset",
    pairs: &[
        ("windFree", "Wind Free"),
        ("windFreeSleep", "Wind Free Sleep"),
        ("speed", "boost"),
        ("smart", "Smart"),
        ("quiet", "Quiet"),
        ("off", "none"),
    ],
};

pub const SWING: Table = Table {
    name: "swing",
    pairs: &[("fixed", "off"), ("all", "on")],
};

/// Every table, for exhaustive checks.
pub const TABLES: [&Table; 4] = [&MODE, &FAN, &PRESET, &SWING];

/// `hvac_action` derived from the raw vendor mode.
pub fn action_for(vendor_mode: &str) -> &'static str {
    match vendor_mode {
        "cool" => "cooling",
        "heat" => "heating",
        "dry" => "drying",
        "wind" => "fan",
        _ => "off",
    }
}

// ── Snapshot -> canonical ────────────────────────────────────────────

const SWITCH: (&str, &str) = ("switch", "switch");
const AC_MODE: (&str, &str) = ("airConditionerMode", "airConditionerMode");
const OPTIONAL_MODE: (&str, &str) = ("custom.airConditionerOptionalMode", "acOptionalMode");
const FAN_MODE: (&str, &str) = ("airConditionerFanMode", "fanMode");
const OSCILLATION: (&str, &str) = ("fanOscillationMode", "fanOscillationMode");
const TEMPERATURE: (&str, &str) = ("temperatureMeasurement", "temperature");
const SETPOINT: (&str, &str) = ("thermostatCoolingSetpoint", "coolingSetpoint");
const HUMIDITY: (&str, &str) = ("relativeHumidityMeasurement", "humidity");
const AUTO_CLEANING: (&str, &str) = ("custom.autoCleaningMode", "autoCleaningMode");
const ENERGY: [&str; 4] = [
    "powerConsumptionReport",
    "powerConsumption",
    "value",
    "persistedEnergy",
];

fn text<'a>(snapshot: &'a Snapshot, (capability, attribute): (&str, &str)) -> Option<&'a str> {
    snapshot.attribute_str(capability, attribute)
}

fn number(snapshot: &Snapshot, (capability, attribute): (&str, &str)) -> Option<f64> {
    snapshot.attribute_f64(capability, attribute)
}

fn require<'a>(snapshot: &'a Snapshot, attr: (&str, &str)) -> Result<&'a str, CoreError> {
    text(snapshot, attr).ok_or_else(|| CoreError::MissingAttribute {
        path: format!("{}.{}.value", attr.0, attr.1),
    })
}

/// Derive the canonical field set from one status snapshot.
///
/// A switched-off unit reports `off` for mode and action and `none` for the
/// preset, whatever its stored mode is.
pub fn canonical_fields(snapshot: &Snapshot) -> Result<CanonicalFields, CoreError> {
    let switch = require(snapshot, SWITCH)?;
    let translated = |attr: (&str, &str), table: &Table| {
        text(snapshot, attr).map(|v| table.to_canonical(v).to_owned())
    };

    let (mode, action, preset) = if switch == "off" {
        (
            "off".to_owned(),
            "off".to_owned(),
            Some(PRESET.to_canonical("off").to_owned()),
        )
    } else {
        let raw_mode = require(snapshot, AC_MODE)?;
        (
            MODE.to_canonical(raw_mode).to_owned(),
            action_for(raw_mode).to_owned(),
            translated(OPTIONAL_MODE, &PRESET),
        )
    };

    Ok(CanonicalFields {
        mode,
        action,
        preset,
        fan_mode: translated(FAN_MODE, &FAN),
        swing_mode: translated(OSCILLATION, &SWING),
        temperature: number(snapshot, TEMPERATURE),
        target_temperature: number(snapshot, SETPOINT),
        humidity: number(snapshot, HUMIDITY),
        auto_cleaning: text(snapshot, AUTO_CLEANING).map(str::to_owned),
        energy_wh: snapshot.f64(&ENERGY),
    })
}

// ── Canonical -> command batch ───────────────────────────────────────

/// Translate an inbound `/set` payload into a vendor command batch.
pub fn command_for(setting: Setting, payload: &str) -> Result<CommandBatch, CoreError> {
    let value = payload.trim();
    if value.is_empty() {
        return Err(invalid(setting, payload, "empty payload"));
    }

    let commands = match setting {
        Setting::Mode if value == "off" => vec![Command::new("switch", "off")],
        Setting::Mode => vec![
            Command::new("switch", "on"),
            Command::new(AC_MODE.0, "setAirConditionerMode").arg(MODE.to_vendor(value)),
        ],
        Setting::Fan => vec![Command::new(FAN_MODE.0, "setFanMode").arg(FAN.to_vendor(value))],
        Setting::Preset => vec![
            Command::new(OPTIONAL_MODE.0, "setAcOptionalMode").arg(PRESET.to_vendor(value)),
        ],
        Setting::SwingMode => vec![
            Command::new(OSCILLATION.0, "setFanOscillationMode").arg(SWING.to_vendor(value)),
        ],
        Setting::TargetTemperature => {
            vec![Command::new(SETPOINT.0, "setCoolingSetpoint").arg(setpoint(value)?)]
        }
        Setting::Autocleaning => {
            vec![Command::new(AUTO_CLEANING.0, "setAutoCleaningMode").arg(value)]
        }
    };
    Ok(CommandBatch::new(commands))
}

/// The batch that asks the unit to re-sample its sensors.
pub fn sensing_batch() -> CommandBatch {
    CommandBatch::single(Command::new("custom.periodicSensing", "triggerManualSensing"))
}

/// Parse a setpoint and truncate it toward zero.
fn setpoint(value: &str) -> Result<i64, CoreError> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| invalid(Setting::TargetTemperature, value, "not a number"))?;
    if !parsed.is_finite() || parsed.abs() > 1_000.0 {
        return Err(invalid(Setting::TargetTemperature, value, "out of range"));
    }
    #[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
    let whole = parsed.trunc() as i64;
    Ok(whole)
}

fn invalid(setting: Setting, value: &str, reason: &str) -> CoreError {
    CoreError::InvalidCommand {
        setting: setting.to_string(),
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;

    fn snapshot(value: Value) -> Snapshot {
        Snapshot::from_value(value).expect("object")
    }

    fn full(switch: &str, mode: &str) -> Snapshot {
        snapshot(json!({
            "switch": { "switch": { "value": switch } },
            "airConditionerMode": { "airConditionerMode": { "value": mode } },
            "custom.airConditionerOptionalMode": { "acOptionalMode": { "value": "windFree" } },
            "airConditionerFanMode": { "fanMode": { "value": "turbo" } },
            "fanOscillationMode": { "fanOscillationMode": { "value": "fixed" } },
            "temperatureMeasurement": { "temperature": { "value": 24.5, "unit": "C" } },
            "thermostatCoolingSetpoint": { "coolingSetpoint": { "value": 22 } },
            "relativeHumidityMeasurement": { "humidity": { "value": 48 } },
            "custom.autoCleaningMode": { "autoCleaningMode": { "value": "on" } },
            "powerConsumptionReport": { "powerConsumption": { "value": {
                "energy": 1_234_567, "persistedEnergy": 987
            } } }
        }))
    }

    fn args(batch: &CommandBatch) -> Vec<(String, String, Vec<Value>)> {
        batch
            .commands()
            .iter()
            .map(|c| (c.capability.clone(), c.command.clone(), c.arguments.clone()))
            .collect()
    }

    #[test]
    fn tables_round_trip_every_entry() {
        for table in TABLES {
            for (vendor, canonical) in table.pairs {
                assert_eq!(table.to_canonical(vendor), *canonical, "{}", table.name);
                assert_eq!(table.to_vendor(canonical), *vendor, "{}", table.name);
            }
        }
    }

    #[test]
    fn unknown_values_pass_through_both_ways() {
        for table in TABLES {
            assert_eq!(table.to_canonical("sleep"), "sleep");
            assert_eq!(table.to_vendor("sleep"), "sleep");
        }
    }

    #[test]
    fn switched_on_unit_translates_every_field() {
        let fields = canonical_fields(&full("on", "cool")).expect("fields");
        assert_eq!(
            fields,
            CanonicalFields {
                mode: "cool".into(),
                action: "cooling".into(),
                preset: Some("Wind Free".into()),
                fan_mode: Some("Turbo".into()),
                swing_mode: Some("off".into()),
                temperature: Some(24.5),
                target_temperature: Some(22.0),
                humidity: Some(48.0),
                auto_cleaning: Some("on".into()),
                energy_wh: Some(987.0),
            }
        );
    }

    #[test]
    fn switch_off_forces_mode_and_action_off() {
        let fields = canonical_fields(&full("off", "cool")).expect("fields");
        assert_eq!(fields.mode, "off");
        assert_eq!(fields.action, "off");
        assert_eq!(fields.preset.as_deref(), Some("none"));
    }

    #[test]
    fn wind_mode_is_fan_only_with_fan_action() {
        let fields = canonical_fields(&full("on", "wind")).expect("fields");
        assert_eq!(fields.mode, "fan_only");
        assert_eq!(fields.action, "fan");
    }

    #[test]
    fn unmapped_modes_have_no_action() {
        let fields = canonical_fields(&full("on", "auto")).expect("fields");
        assert_eq!(fields.mode, "auto");
        assert_eq!(fields.action, "off");
    }

    #[test]
    fn missing_switch_is_reported_with_its_path() {
        let err = canonical_fields(&snapshot(json!({}))).expect_err("no switch");
        match err {
            CoreError::MissingAttribute { path } => assert_eq!(path, "switch.switch.value"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let fields = canonical_fields(&snapshot(json!({
            "switch": { "switch": { "value": "on" } },
            "airConditionerMode": { "airConditionerMode": { "value": "dry" } }
        })))
        .expect("fields");
        assert_eq!(fields.action, "drying");
        assert_eq!(fields.fan_mode, None);
        assert_eq!(fields.energy_wh, None);
        assert_eq!(fields.entries().len(), 2);
    }

    #[test]
    fn mode_off_is_a_switch_command() {
        let batch = command_for(Setting::Mode, "off").expect("batch");
        assert_eq!(
            args(&batch),
            vec![
                ("switch".into(), "off".into(), vec![]),
                ("refresh".into(), "refresh".into(), vec![]),
            ]
        );
    }

    #[test]
    fn other_modes_switch_on_and_translate() {
        let batch = command_for(Setting::Mode, "fan_only").expect("batch");
        assert_eq!(
            args(&batch),
            vec![
                ("switch".into(), "on".into(), vec![]),
                (
                    "airConditionerMode".into(),
                    "setAirConditionerMode".into(),
                    vec![json!("wind")]
                ),
                ("refresh".into(), "refresh".into(), vec![]),
            ]
        );
    }

    #[test]
    fn presets_fans_and_swing_map_to_vendor_values() {
        let preset = command_for(Setting::Preset, "Wind Free Sleep").expect("preset");
        assert_eq!(preset.commands()[0].arguments, vec![json!("windFreeSleep")]);

        let fan = command_for(Setting::Fan, "Turbo").expect("fan");
        assert_eq!(fan.commands()[0].arguments, vec![json!("turbo")]);

        let swing = command_for(Setting::SwingMode, "on").expect("swing");
        assert_eq!(swing.commands()[0].command, "setFanOscillationMode");
        assert_eq!(swing.commands()[0].arguments, vec![json!("all")]);

        let unknown = command_for(Setting::Preset, "sleep").expect("unknown preset");
        assert_eq!(unknown.commands()[0].arguments, vec![json!("sleep")]);
    }

    #[test]
    fn target_temperature_is_truncated() {
        let batch = command_for(Setting::TargetTemperature, " 22.9 ").expect("batch");
        assert_eq!(batch.commands()[0].capability, "thermostatCoolingSetpoint");
        assert_eq!(batch.commands()[0].arguments, vec![json!(22)]);
    }

    #[test]
    fn non_numeric_target_temperature_is_rejected() {
        for payload in ["warm", "NaN", "inf", ""] {
            let err = command_for(Setting::TargetTemperature, payload).expect_err(payload);
            assert!(
                matches!(err, CoreError::InvalidCommand { .. }),
                "{payload}: {err:?}"
            );
        }
    }

    #[test]
    fn sensing_batch_ends_with_refresh() {
        assert_eq!(
            args(&sensing_batch()),
            vec![
                (
                    "custom.periodicSensing".into(),
                    "triggerManualSensing".into(),
                    vec![]
                ),
                ("refresh".into(), "refresh".into(), vec![]),
            ]
        );
    }
}
