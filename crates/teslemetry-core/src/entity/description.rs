// ── Entity descriptions ──
//
// Static tables binding a flat data key to a platform, unit, value
// transform and, where the vehicle can push it, a streaming field name.

use serde_json::Value;

use crate::command::{EnergyCommand, VehicleCommand};

/// How an entity renders its value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, serde::Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Sensor,
    BinarySensor,
    Switch,
}

/// Value conversion from the raw data map entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Identity,
    Lowercase,
    /// Gear: `null` means parked.
    ShiftState,
    Round(u32),
    Equals(&'static str),
    NotEquals(&'static str),
    Truthy,
    /// Truthy, inverted. For "disallow" flags shown as "allow" switches.
    Falsy,
}

impl Transform {
    /// Apply to a raw value. `None` means unknown.
    pub fn apply(self, raw: Option<&Value>) -> Option<Value> {
        match self {
            Self::ShiftState => Some(Value::String(
                raw.and_then(Value::as_str)
                    .map_or_else(|| "p".to_owned(), str::to_lowercase),
            )),
            Self::Identity => raw.filter(|v| !v.is_null()).cloned(),
            Self::Lowercase => {
                let raw = raw.filter(|v| !v.is_null())?;
                Some(match raw.as_str() {
                    Some(s) => Value::String(s.to_lowercase()),
                    None => raw.clone(),
                })
            }
            Self::Round(digits) => {
                let n = raw?.as_f64()?;
                let scale = 10_f64.powi(i32::try_from(digits).unwrap_or(0));
                let rounded = (n * scale).round() / scale;
                serde_json::Number::from_f64(rounded).map(Value::Number)
            }
            Self::Equals(expected) => {
                let raw = raw.filter(|v| !v.is_null())?;
                Some(Value::Bool(raw.as_str() == Some(expected)))
            }
            Self::NotEquals(expected) => {
                let raw = raw.filter(|v| !v.is_null())?;
                Some(Value::Bool(raw.as_str() != Some(expected)))
            }
            Self::Truthy => raw.filter(|v| !v.is_null()).map(|v| Value::Bool(truthy(v))),
            Self::Falsy => raw.filter(|v| !v.is_null()).map(|v| Value::Bool(!truthy(v))),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// What a switch sends when toggled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchAction {
    Charge,
    SentryMode,
    DefrostMode,
    SteeringWheelHeater,
    ValetMode,
    StormMode,
    /// Inverted: "on" allows grid charging.
    GridCharging,
}

impl SwitchAction {
    pub fn vehicle_command(self, on: bool) -> Option<VehicleCommand> {
        match self {
            Self::Charge if on => Some(VehicleCommand::ChargeStart),
            Self::Charge => Some(VehicleCommand::ChargeStop),
            Self::SentryMode => Some(VehicleCommand::SetSentryMode { on }),
            Self::DefrostMode => Some(VehicleCommand::SetPreconditioningMax { on }),
            Self::SteeringWheelHeater => Some(VehicleCommand::SteeringWheelHeater { on }),
            Self::ValetMode => Some(VehicleCommand::SetValetMode { on, password: None }),
            Self::StormMode | Self::GridCharging => None,
        }
    }

    pub fn energy_command(self, on: bool) -> Option<EnergyCommand> {
        match self {
            Self::StormMode => Some(EnergyCommand::StormMode { enabled: on }),
            Self::GridCharging => Some(EnergyCommand::GridImportExport {
                disallow_charge_from_grid_with_solar_installed: Some(!on),
                customer_preferred_export_rule: None,
            }),
            _ => None,
        }
    }

    /// Raw value written back optimistically after a successful toggle.
    pub fn stored_value(self, on: bool) -> Value {
        match self {
            Self::GridCharging => Value::Bool(!on),
            _ => Value::Bool(on),
        }
    }
}

/// One row of an entity table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityDescription {
    pub key: &'static str,
    pub platform: Platform,
    pub unit: Option<&'static str>,
    pub transform: Transform,
    pub streaming_field: Option<&'static str>,
    pub switch: Option<SwitchAction>,
}

impl EntityDescription {
    const fn new(key: &'static str, platform: Platform, transform: Transform) -> Self {
        Self {
            key,
            platform,
            unit: None,
            transform,
            streaming_field: None,
            switch: None,
        }
    }

    const fn sensor(key: &'static str, unit: Option<&'static str>) -> Self {
        Self {
            unit,
            ..Self::new(key, Platform::Sensor, Transform::Identity)
        }
    }

    const fn binary(key: &'static str, transform: Transform) -> Self {
        Self::new(key, Platform::BinarySensor, transform)
    }

    const fn switch(key: &'static str, action: SwitchAction, transform: Transform) -> Self {
        Self {
            switch: Some(action),
            ..Self::new(key, Platform::Switch, transform)
        }
    }

    const fn transform(self, transform: Transform) -> Self {
        Self { transform, ..self }
    }

    const fn streaming(self, field: &'static str) -> Self {
        Self {
            streaming_field: Some(field),
            ..self
        }
    }
}

// ── Units ────────────────────────────────────────────────────────────

const PERCENT: Option<&str> = Some("%");
const KW: Option<&str> = Some("kW");
const W: Option<&str> = Some("W");
const WH: Option<&str> = Some("Wh");
const KWH: Option<&str> = Some("kWh");
const VOLT: Option<&str> = Some("V");
const AMP: Option<&str> = Some("A");
const MILES: Option<&str> = Some("mi");
const MPH: Option<&str> = Some("mph");
const CELSIUS: Option<&str> = Some("°C");
const BAR: Option<&str> = Some("bar");
const MINUTES: Option<&str> = Some("min");

// ── Vehicle ──────────────────────────────────────────────────────────

pub static VEHICLE_DESCRIPTIONS: &[EntityDescription] = &[
    // Charging
    EntityDescription::sensor("charge_state_battery_level", PERCENT).streaming("BatteryLevel"),
    EntityDescription::sensor("charge_state_usable_battery_level", PERCENT),
    EntityDescription::sensor("charge_state_charging_state", None)
        .transform(Transform::Lowercase),
    EntityDescription::sensor("charge_state_charge_energy_added", KWH)
        .streaming("ACChargingEnergyIn"),
    EntityDescription::sensor("charge_state_charger_power", KW).streaming("ACChargingPower"),
    EntityDescription::sensor("charge_state_charger_voltage", VOLT).streaming("ChargerVoltage"),
    EntityDescription::sensor("charge_state_charger_actual_current", AMP).streaming("ChargeAmps"),
    EntityDescription::sensor("charge_state_charge_rate", MPH),
    EntityDescription::sensor("charge_state_battery_range", MILES).streaming("RatedRange"),
    EntityDescription::sensor("charge_state_est_battery_range", MILES)
        .streaming("EstBatteryRange"),
    EntityDescription::sensor("charge_state_ideal_battery_range", MILES)
        .streaming("IdealBatteryRange"),
    // Driving
    EntityDescription::sensor("drive_state_speed", MPH).streaming("VehicleSpeed"),
    EntityDescription::sensor("drive_state_power", KW),
    EntityDescription::sensor("drive_state_shift_state", None)
        .transform(Transform::ShiftState)
        .streaming("Gear"),
    EntityDescription::sensor("vehicle_state_odometer", MILES)
        .transform(Transform::Round(1))
        .streaming("Odometer"),
    EntityDescription::sensor("drive_state_active_route_destination", None)
        .streaming("DestinationName"),
    EntityDescription::sensor("drive_state_active_route_miles_to_arrival", MILES)
        .streaming("MilesToArrival"),
    EntityDescription::sensor("drive_state_active_route_minutes_to_arrival", MINUTES)
        .streaming("MinutesToArrival"),
    // Climate
    EntityDescription::sensor("climate_state_inside_temp", CELSIUS).streaming("InsideTemp"),
    EntityDescription::sensor("climate_state_outside_temp", CELSIUS).streaming("OutsideTemp"),
    EntityDescription::sensor("climate_state_driver_temp_setting", CELSIUS),
    EntityDescription::sensor("climate_state_passenger_temp_setting", CELSIUS),
    // Tyres
    EntityDescription::sensor("vehicle_state_tpms_pressure_fl", BAR).streaming("TpmsPressureFl"),
    EntityDescription::sensor("vehicle_state_tpms_pressure_fr", BAR).streaming("TpmsPressureFr"),
    EntityDescription::sensor("vehicle_state_tpms_pressure_rl", BAR).streaming("TpmsPressureRl"),
    EntityDescription::sensor("vehicle_state_tpms_pressure_rr", BAR).streaming("TpmsPressureRr"),
    // Binary sensors
    EntityDescription::binary("state", Transform::Equals("online")),
    EntityDescription::binary("charge_state_battery_heater_on", Transform::Truthy)
        .streaming("BatteryHeaterOn"),
    EntityDescription::binary("charge_state_preconditioning_enabled", Transform::Truthy),
    EntityDescription::binary("charge_state_scheduled_charging_pending", Transform::Truthy)
        .streaming("ScheduledChargingPending"),
    EntityDescription::binary("charge_state_trip_charging", Transform::Truthy),
    EntityDescription::binary("charge_state_conn_charge_cable", Transform::NotEquals("<invalid>")),
    EntityDescription::binary(
        "climate_state_cabin_overheat_protection_actively_cooling",
        Transform::Truthy,
    ),
    EntityDescription::binary("vehicle_state_dashcam_state", Transform::Equals("Recording")),
    EntityDescription::binary("vehicle_state_is_user_present", Transform::Truthy),
    EntityDescription::binary("vehicle_state_tpms_soft_warning_fl", Transform::Truthy),
    EntityDescription::binary("vehicle_state_tpms_soft_warning_fr", Transform::Truthy),
    EntityDescription::binary("vehicle_state_tpms_soft_warning_rl", Transform::Truthy),
    EntityDescription::binary("vehicle_state_tpms_soft_warning_rr", Transform::Truthy),
    EntityDescription::binary("vehicle_state_fd_window", Transform::Truthy),
    EntityDescription::binary("vehicle_state_fp_window", Transform::Truthy),
    EntityDescription::binary("vehicle_state_rd_window", Transform::Truthy),
    EntityDescription::binary("vehicle_state_rp_window", Transform::Truthy),
    // Switches
    EntityDescription::switch(
        "charge_state_charge_enable_request",
        SwitchAction::Charge,
        Transform::Truthy,
    )
    .streaming("ChargeEnableRequest"),
    EntityDescription::switch(
        "vehicle_state_sentry_mode",
        SwitchAction::SentryMode,
        Transform::Truthy,
    ),
    EntityDescription::switch(
        "climate_state_defrost_mode",
        SwitchAction::DefrostMode,
        Transform::Truthy,
    ),
    EntityDescription::switch(
        "climate_state_steering_wheel_heater",
        SwitchAction::SteeringWheelHeater,
        Transform::Truthy,
    ),
    EntityDescription::switch(
        "vehicle_state_valet_mode",
        SwitchAction::ValetMode,
        Transform::Truthy,
    )
    .streaming("ValetModeEnabled"),
];

// ── Energy site ──────────────────────────────────────────────────────

pub static ENERGY_LIVE_DESCRIPTIONS: &[EntityDescription] = &[
    EntityDescription::sensor("solar_power", W),
    EntityDescription::sensor("energy_left", WH),
    EntityDescription::sensor("total_pack_energy", WH),
    EntityDescription::sensor("percentage_charged", PERCENT).transform(Transform::Round(2)),
    EntityDescription::sensor("battery_power", W),
    EntityDescription::sensor("load_power", W),
    EntityDescription::sensor("grid_power", W),
    EntityDescription::sensor("grid_services_power", W),
    EntityDescription::sensor("generator_power", W),
    EntityDescription::sensor("island_status", None),
    EntityDescription::binary("backup_capable", Transform::Truthy),
    EntityDescription::binary("grid_services_active", Transform::Truthy),
    EntityDescription::binary("storm_mode_active", Transform::Truthy),
];

pub static ENERGY_INFO_DESCRIPTIONS: &[EntityDescription] = &[
    EntityDescription::sensor("vpp_backup_reserve_percent", PERCENT),
    EntityDescription::sensor("backup_reserve_percent", PERCENT),
    EntityDescription::sensor("version", None),
    EntityDescription::sensor("default_real_mode", None),
    EntityDescription::binary("components_grid_services_enabled", Transform::Truthy),
    EntityDescription::switch(
        "user_settings_storm_mode_enabled",
        SwitchAction::StormMode,
        Transform::Truthy,
    ),
    EntityDescription::switch(
        "components_disallow_charge_from_grid_with_solar_installed",
        SwitchAction::GridCharging,
        Transform::Falsy,
    ),
];

pub static WALL_CONNECTOR_DESCRIPTIONS: &[EntityDescription] = &[
    EntityDescription::sensor("wall_connector_state", None),
    EntityDescription::sensor("wall_connector_fault_state", None),
    EntityDescription::sensor("wall_connector_power", W),
    EntityDescription::sensor("vin", None),
];

/// Streaming field name -> flat data key, from the vehicle table.
pub fn streaming_field_map() -> std::collections::HashMap<&'static str, &'static str> {
    VEHICLE_DESCRIPTIONS
        .iter()
        .filter_map(|d| Some((d.streaming_field?, d.key)))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::*;

    #[test]
    fn shift_state_defaults_to_park() {
        assert_eq!(Transform::ShiftState.apply(None), Some(json!("p")));
        assert_eq!(Transform::ShiftState.apply(Some(&Value::Null)), Some(json!("p")));
        assert_eq!(Transform::ShiftState.apply(Some(&json!("D"))), Some(json!("d")));
    }

    #[test]
    fn round_and_comparisons() {
        assert_eq!(Transform::Round(1).apply(Some(&json!(1234.567))), Some(json!(1234.6)));
        assert_eq!(
            Transform::Equals("online").apply(Some(&json!("asleep"))),
            Some(json!(false))
        );
        assert_eq!(
            Transform::NotEquals("<invalid>").apply(Some(&json!("IEC"))),
            Some(json!(true))
        );
        assert_eq!(Transform::Truthy.apply(Some(&json!(0))), Some(json!(false)));
        assert_eq!(Transform::Falsy.apply(Some(&json!(false))), Some(json!(true)));
        assert_eq!(Transform::Identity.apply(Some(&Value::Null)), None);
    }

    #[test]
    fn keys_are_unique_per_table() {
        for table in [
            VEHICLE_DESCRIPTIONS,
            ENERGY_LIVE_DESCRIPTIONS,
            ENERGY_INFO_DESCRIPTIONS,
            WALL_CONNECTOR_DESCRIPTIONS,
        ] {
            let keys: HashSet<_> = table.iter().map(|d| d.key).collect();
            assert_eq!(keys.len(), table.len());
        }
    }

    #[test]
    fn switches_carry_an_action() {
        for d in VEHICLE_DESCRIPTIONS.iter().chain(ENERGY_INFO_DESCRIPTIONS) {
            assert_eq!(d.platform == Platform::Switch, d.switch.is_some(), "{}", d.key);
        }
    }

    #[test]
    fn streaming_map_resolves_fields() {
        let map = streaming_field_map();
        assert_eq!(map.get("BatteryLevel"), Some(&"charge_state_battery_level"));
        assert_eq!(map.get("Gear"), Some(&"drive_state_shift_state"));
        assert!(!map.contains_key("NotAField"));
    }

    #[test]
    fn grid_charging_switch_is_inverted() {
        let action = SwitchAction::GridCharging;
        assert_eq!(
            action.energy_command(true),
            Some(EnergyCommand::GridImportExport {
                disallow_charge_from_grid_with_solar_installed: Some(false),
                customer_preferred_export_rule: None,
            })
        );
        assert_eq!(action.stored_value(true), json!(false));
        assert!(action.vehicle_command(true).is_none());
    }
}
