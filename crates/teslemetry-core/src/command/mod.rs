// ── Command API ──
//
// Every write goes through one of two typed enums. Each variant knows
// its Fleet API endpoint name and request body; the executor turns the
// vendor reply into a domain result.

mod executor;

use serde_json::{Value, json};

pub use executor::{ACCEPTABLE_REASONS, execute, execute_vehicle_command, interpret_vehicle_reply};

/// Which trunk to actuate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Trunk {
    Front,
    Rear,
}

/// Vehicle write operations (`POST /api/1/vehicles/{vin}/command/{name}`).
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleCommand {
    // ── Charging ─────────────────────────────────────────────────────
    ChargeStart,
    ChargeStop,
    SetChargeLimit {
        percent: u8,
    },
    SetChargingAmps {
        amps: u8,
    },
    ChargePortDoorOpen,
    ChargePortDoorClose,
    SetScheduledCharging {
        enable: bool,
        /// Minutes after midnight.
        time: Option<u32>,
    },
    SetScheduledDeparture {
        enable: bool,
        preconditioning_enabled: bool,
        preconditioning_weekdays_only: bool,
        departure_time: Option<u32>,
        off_peak_charging_enabled: bool,
        off_peak_charging_weekdays_only: bool,
        end_off_peak_time: Option<u32>,
    },

    // ── Climate ──────────────────────────────────────────────────────
    AutoConditioningStart,
    AutoConditioningStop,
    SetTemps {
        driver: f64,
        passenger: f64,
    },
    SetPreconditioningMax {
        on: bool,
    },
    SteeringWheelHeater {
        on: bool,
    },
    SetCabinOverheatProtection {
        on: bool,
        fan_only: bool,
    },

    // ── Security ─────────────────────────────────────────────────────
    DoorLock,
    DoorUnlock,
    SetSentryMode {
        on: bool,
    },
    SetValetMode {
        on: bool,
        password: Option<String>,
    },
    SpeedLimitActivate {
        pin: String,
    },
    SpeedLimitDeactivate {
        pin: String,
    },
    SpeedLimitSetLimit {
        limit_mph: u32,
    },

    // ── Misc ─────────────────────────────────────────────────────────
    HonkHorn,
    FlashLights,
    ActuateTrunk {
        which: Trunk,
    },
    NavigationGpsRequest {
        lat: f64,
        lon: f64,
        order: u32,
    },
}

impl VehicleCommand {
    /// Endpoint name under `command/`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChargeStart => "charge_start",
            Self::ChargeStop => "charge_stop",
            Self::SetChargeLimit { .. } => "set_charge_limit",
            Self::SetChargingAmps { .. } => "set_charging_amps",
            Self::ChargePortDoorOpen => "charge_port_door_open",
            Self::ChargePortDoorClose => "charge_port_door_close",
            Self::SetScheduledCharging { .. } => "set_scheduled_charging",
            Self::SetScheduledDeparture { .. } => "set_scheduled_departure",
            Self::AutoConditioningStart => "auto_conditioning_start",
            Self::AutoConditioningStop => "auto_conditioning_stop",
            Self::SetTemps { .. } => "set_temps",
            Self::SetPreconditioningMax { .. } => "set_preconditioning_max",
            Self::SteeringWheelHeater { .. } => "remote_steering_wheel_heater_request",
            Self::SetCabinOverheatProtection { .. } => "set_cabin_overheat_protection",
            Self::DoorLock => "door_lock",
            Self::DoorUnlock => "door_unlock",
            Self::SetSentryMode { .. } => "set_sentry_mode",
            Self::SetValetMode { .. } => "set_valet_mode",
            Self::SpeedLimitActivate { .. } => "speed_limit_activate",
            Self::SpeedLimitDeactivate { .. } => "speed_limit_deactivate",
            Self::SpeedLimitSetLimit { .. } => "speed_limit_set_limit",
            Self::HonkHorn => "honk_horn",
            Self::FlashLights => "flash_lights",
            Self::ActuateTrunk { .. } => "actuate_trunk",
            Self::NavigationGpsRequest { .. } => "navigation_gps_request",
        }
    }

    /// JSON request body.
    pub fn body(&self) -> Value {
        match self {
            Self::SetChargeLimit { percent } => json!({ "percent": percent }),
            Self::SetChargingAmps { amps } => json!({ "charging_amps": amps }),
            Self::SetScheduledCharging { enable, time } => json!({
                "enable": enable,
                "time": time,
            }),
            Self::SetScheduledDeparture {
                enable,
                preconditioning_enabled,
                preconditioning_weekdays_only,
                departure_time,
                off_peak_charging_enabled,
                off_peak_charging_weekdays_only,
                end_off_peak_time,
            } => json!({
                "enable": enable,
                "preconditioning_enabled": preconditioning_enabled,
                "preconditioning_weekdays_only": preconditioning_weekdays_only,
                "departure_time": departure_time,
                "off_peak_charging_enabled": off_peak_charging_enabled,
                "off_peak_charging_weekdays_only": off_peak_charging_weekdays_only,
                "end_off_peak_time": end_off_peak_time,
            }),
            Self::SetTemps { driver, passenger } => json!({
                "driver_temp": driver,
                "passenger_temp": passenger,
            }),
            Self::SetPreconditioningMax { on }
            | Self::SteeringWheelHeater { on }
            | Self::SetSentryMode { on } => json!({ "on": on }),
            Self::SetCabinOverheatProtection { on, fan_only } => json!({
                "on": on,
                "fan_only": fan_only,
            }),
            Self::SetValetMode { on, password } => match password {
                Some(password) => json!({ "on": on, "password": password }),
                None => json!({ "on": on }),
            },
            Self::SpeedLimitActivate { pin } | Self::SpeedLimitDeactivate { pin } => {
                json!({ "pin": pin })
            }
            Self::SpeedLimitSetLimit { limit_mph } => json!({ "limit_mph": limit_mph }),
            Self::ActuateTrunk { which } => json!({ "which_trunk": which.to_string() }),
            Self::NavigationGpsRequest { lat, lon, order } => json!({
                "lat": lat,
                "lon": lon,
                "order": order,
            }),
            Self::ChargeStart
            | Self::ChargeStop
            | Self::ChargePortDoorOpen
            | Self::ChargePortDoorClose
            | Self::AutoConditioningStart
            | Self::AutoConditioningStop
            | Self::DoorLock
            | Self::DoorUnlock
            | Self::HonkHorn
            | Self::FlashLights => json!({}),
        }
    }
}

/// Energy site write operations (`POST /api/1/energy_sites/{id}/{name}`).
#[derive(Debug, Clone, PartialEq)]
pub enum EnergyCommand {
    Backup {
        percent: u8,
    },
    /// `self_consumption`, `autonomous` or `backup`.
    OperationMode {
        mode: String,
    },
    StormMode {
        enabled: bool,
    },
    GridImportExport {
        disallow_charge_from_grid_with_solar_installed: Option<bool>,
        customer_preferred_export_rule: Option<String>,
    },
    OffGridVehicleChargingReserve {
        percent: u8,
    },
    TimeOfUseSettings {
        settings: Value,
    },
}

impl EnergyCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Backup { .. } => "backup",
            Self::OperationMode { .. } => "operation",
            Self::StormMode { .. } => "storm_mode",
            Self::GridImportExport { .. } => "grid_import_export",
            Self::OffGridVehicleChargingReserve { .. } => "off_grid_vehicle_charging_reserve",
            Self::TimeOfUseSettings { .. } => "time_of_use_settings",
        }
    }

    pub fn body(&self) -> Value {
        match self {
            Self::Backup { percent } => json!({ "backup_reserve_percent": percent }),
            Self::OperationMode { mode } => json!({ "default_real_mode": mode }),
            Self::StormMode { enabled } => json!({ "enabled": enabled }),
            Self::GridImportExport {
                disallow_charge_from_grid_with_solar_installed,
                customer_preferred_export_rule,
            } => {
                let mut body = serde_json::Map::new();
                if let Some(disallow) = disallow_charge_from_grid_with_solar_installed {
                    body.insert(
                        "disallow_charge_from_grid_with_solar_installed".into(),
                        Value::Bool(*disallow),
                    );
                }
                if let Some(rule) = customer_preferred_export_rule {
                    body.insert(
                        "customer_preferred_export_rule".into(),
                        Value::String(rule.clone()),
                    );
                }
                Value::Object(body)
            }
            Self::OffGridVehicleChargingReserve { percent } => json!({
                "off_grid_vehicle_charging_reserve_percent": percent,
            }),
            Self::TimeOfUseSettings { settings } => json!({ "tou_settings": settings }),
        }
    }
}
