//! Vehicle command handlers.

use serde_json::Value;

use teslemetry_core::{Service, Teslemetry, Trunk, VehicleCommand};

use crate::cli::{GlobalOpts, TrunkArg, VehicleAction, VehicleCommandArgs};
use crate::error::CliError;
use crate::output;

/// Either a plain command or a validated service call.
enum Request {
    Command(VehicleCommand),
    Service(Service),
}

fn request(vin: String, action: VehicleAction) -> Request {
    let command = match action {
        VehicleAction::ChargeStart => VehicleCommand::ChargeStart,
        VehicleAction::ChargeStop => VehicleCommand::ChargeStop,
        VehicleAction::ChargeLimit { percent } => VehicleCommand::SetChargeLimit { percent },
        VehicleAction::ChargingAmps { amps } => VehicleCommand::SetChargingAmps { amps },
        VehicleAction::ChargePort { state } if state.enabled() => {
            VehicleCommand::ChargePortDoorOpen
        }
        VehicleAction::ChargePort { .. } => VehicleCommand::ChargePortDoorClose,
        VehicleAction::Climate { state } if state.enabled() => {
            VehicleCommand::AutoConditioningStart
        }
        VehicleAction::Climate { .. } => VehicleCommand::AutoConditioningStop,
        VehicleAction::SetTemps { driver, passenger } => VehicleCommand::SetTemps {
            driver,
            passenger: passenger.unwrap_or(driver),
        },
        VehicleAction::Lock => VehicleCommand::DoorLock,
        VehicleAction::Unlock => VehicleCommand::DoorUnlock,
        VehicleAction::Sentry { state } => VehicleCommand::SetSentryMode {
            on: state.enabled(),
        },
        VehicleAction::Honk => VehicleCommand::HonkHorn,
        VehicleAction::Flash => VehicleCommand::FlashLights,
        VehicleAction::Trunk { which } => VehicleCommand::ActuateTrunk {
            which: match which {
                TrunkArg::Front => Trunk::Front,
                TrunkArg::Rear => Trunk::Rear,
            },
        },

        // ── Validated through services ──────────────────────────────
        VehicleAction::Navigate {
            latitude,
            longitude,
            order,
        } => {
            return Request::Service(Service::NavigateGpsRequest {
                device_id: vin,
                latitude,
                longitude,
                order,
            });
        }
        VehicleAction::ScheduledCharging { state, time } => {
            return Request::Service(Service::SetScheduledCharging {
                device_id: vin,
                enable: state.enabled(),
                time,
            });
        }
        VehicleAction::Valet { state, pin } => {
            return Request::Service(Service::ValetMode {
                device_id: vin,
                enable: state.enabled(),
                pin,
            });
        }
        VehicleAction::SpeedLimit { state, pin } => {
            return Request::Service(Service::SpeedLimit {
                device_id: vin,
                enable: state.enabled(),
                pin,
            });
        }
    };
    Request::Command(command)
}

pub async fn handle(
    teslemetry: &Teslemetry,
    args: VehicleCommandArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let vin = args.vin;
    let applied = match request(vin.clone(), args.action) {
        Request::Command(command) => teslemetry.vehicle(&vin)?.command(&command).await?,
        Request::Service(service) => {
            matches!(teslemetry.call_service(service).await?, Value::Bool(true))
        }
    };

    if !global.quiet {
        if applied {
            eprintln!("✓ Command sent to {vin}");
        } else {
            eprintln!("Command accepted by {vin}, nothing to change");
        }
    }
    Ok(())
}

/// Wake `vin` and report its state.
pub async fn wake(teslemetry: &Teslemetry, vin: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let vehicle = teslemetry.vehicle(vin)?;
    vehicle.wake_up_if_asleep().await?;

    let state = vehicle
        .state()
        .map_or_else(|| "unknown".to_owned(), |s| s.to_string());
    let out = output::render_single(
        &global.output,
        &serde_json::json!({ "vin": vin, "state": state }),
        |_| format!("{vin} is {state}"),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
