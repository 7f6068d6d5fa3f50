// ── Services ──
//
// Account-level actions that take a device id plus parameters, validate
// them, and dispatch a command. Vehicle services wake the vehicle first;
// some write the expected result back into the data map so entities
// update before the next poll.

use serde_json::Value;
use tracing::info;

use crate::command::{EnergyCommand, VehicleCommand};
use crate::context::Teslemetry;
use crate::error::CoreError;
use crate::model::{EnergySite, Vehicle};

/// A service call. `device_id` is a VIN or an energy site id.
#[derive(Debug, Clone, PartialEq)]
pub enum Service {
    NavigateGpsRequest {
        device_id: String,
        latitude: f64,
        longitude: f64,
        order: u32,
    },
    SetScheduledCharging {
        device_id: String,
        enable: bool,
        /// Minutes after midnight. Required when enabling.
        time: Option<u32>,
    },
    SetScheduledDeparture {
        device_id: String,
        enable: bool,
        preconditioning_enabled: bool,
        preconditioning_weekdays_only: bool,
        departure_time: Option<u32>,
        off_peak_charging_enabled: bool,
        off_peak_charging_weekdays_only: bool,
        end_off_peak_time: Option<u32>,
    },
    ValetMode {
        device_id: String,
        enable: bool,
        pin: Option<String>,
    },
    SpeedLimit {
        device_id: String,
        enable: bool,
        pin: String,
    },
    TimeOfUse {
        device_id: String,
        tou_settings: Value,
    },
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NavigateGpsRequest { .. } => "navigation_gps_request",
            Self::SetScheduledCharging { .. } => "set_scheduled_charging",
            Self::SetScheduledDeparture { .. } => "set_scheduled_departure",
            Self::ValetMode { .. } => "valet_mode",
            Self::SpeedLimit { .. } => "speed_limit",
            Self::TimeOfUse { .. } => "time_of_use",
        }
    }
}

impl Teslemetry {
    /// Validate and run a service. Vehicle services return the command
    /// outcome as a JSON bool; energy services return the vendor reply.
    pub async fn call_service(&self, service: Service) -> Result<Value, CoreError> {
        let name = service.name();
        let result = match service {
            Service::NavigateGpsRequest {
                device_id,
                latitude,
                longitude,
                order,
            } => {
                let vehicle = self.resolve_vehicle(&device_id)?;
                let applied = vehicle
                    .command(&VehicleCommand::NavigationGpsRequest {
                        lat: latitude,
                        lon: longitude,
                        order,
                    })
                    .await?;
                Value::Bool(applied)
            }

            Service::SetScheduledCharging {
                device_id,
                enable,
                time,
            } => {
                if enable && time.is_none() {
                    return Err(validation("a time is required to enable scheduled charging"));
                }
                let vehicle = self.resolve_vehicle(&device_id)?;
                let applied = vehicle
                    .command(&VehicleCommand::SetScheduledCharging { enable, time })
                    .await?;
                let data = vehicle.data();
                if enable {
                    data.insert("charge_state_scheduled_charging_mode", Value::from("StartAt"));
                    data.insert("charge_state_scheduled_charging_start_time", Value::from(time));
                } else {
                    data.insert("charge_state_scheduled_charging_mode", Value::from("Off"));
                }
                data.notify();
                Value::Bool(applied)
            }

            Service::SetScheduledDeparture {
                device_id,
                enable,
                preconditioning_enabled,
                preconditioning_weekdays_only,
                departure_time,
                off_peak_charging_enabled,
                off_peak_charging_weekdays_only,
                end_off_peak_time,
            } => {
                if preconditioning_enabled && departure_time.is_none() {
                    return Err(validation("a departure time is required for preconditioning"));
                }
                if off_peak_charging_enabled && end_off_peak_time.is_none() {
                    return Err(validation("an end time is required for off-peak charging"));
                }
                let vehicle = self.resolve_vehicle(&device_id)?;
                let applied = vehicle
                    .command(&VehicleCommand::SetScheduledDeparture {
                        enable,
                        preconditioning_enabled,
                        preconditioning_weekdays_only,
                        departure_time,
                        off_peak_charging_enabled,
                        off_peak_charging_weekdays_only,
                        end_off_peak_time,
                    })
                    .await?;
                Value::Bool(applied)
            }

            Service::ValetMode {
                device_id,
                enable,
                pin,
            } => {
                if let Some(pin) = &pin {
                    validate_pin(pin)?;
                }
                let vehicle = self.resolve_vehicle(&device_id)?;
                let applied = vehicle
                    .command(&VehicleCommand::SetValetMode {
                        on: enable,
                        password: pin,
                    })
                    .await?;
                vehicle.data().set("vehicle_state_valet_mode", Value::Bool(enable));
                Value::Bool(applied)
            }

            Service::SpeedLimit {
                device_id,
                enable,
                pin,
            } => {
                validate_pin(&pin)?;
                let vehicle = self.resolve_vehicle(&device_id)?;
                let command = if enable {
                    VehicleCommand::SpeedLimitActivate { pin }
                } else {
                    VehicleCommand::SpeedLimitDeactivate { pin }
                };
                let applied = vehicle.command(&command).await?;
                vehicle
                    .data()
                    .set("vehicle_state_speed_limit_mode_active", Value::Bool(enable));
                Value::Bool(applied)
            }

            Service::TimeOfUse {
                device_id,
                tou_settings,
            } => {
                let site = self.resolve_energy_site(&device_id)?;
                let reply = site
                    .command(&EnergyCommand::TimeOfUseSettings {
                        settings: tou_settings,
                    })
                    .await?;
                if let Some(error) = reply.get("error").filter(|e| !e.is_null()) {
                    return Err(CoreError::CommandError {
                        error: error.as_str().map_or_else(|| error.to_string(), str::to_owned),
                    });
                }
                reply
            }
        };

        info!(service = name, "service call complete");
        Ok(result)
    }

    fn resolve_vehicle(&self, device_id: &str) -> Result<&Vehicle, CoreError> {
        self.vehicles()
            .iter()
            .find(|v| v.vin() == device_id)
            .map(|arc| &**arc)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: device_id.to_owned(),
            })
    }

    fn resolve_energy_site(&self, device_id: &str) -> Result<&EnergySite, CoreError> {
        self.energy_sites()
            .iter()
            .find(|s| s.site_id().to_string() == device_id)
            .map(|arc| &**arc)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: device_id.to_owned(),
            })
    }
}

fn validation(message: &str) -> CoreError {
    CoreError::ValidationFailed {
        message: message.to_owned(),
    }
}

fn validate_pin(pin: &str) -> Result<(), CoreError> {
    if pin.len() == 4 && pin.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(validation("PIN must be four digits"))
    }
}
