//! Energy site command handlers.

use teslemetry_core::{EnergyCommand, Service, Teslemetry};

use crate::cli::{EnergyAction, EnergyArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    teslemetry: &Teslemetry,
    args: EnergyArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let command = match args.action {
        EnergyAction::BackupReserve { percent } => EnergyCommand::Backup { percent },
        EnergyAction::Mode { mode } => EnergyCommand::OperationMode {
            mode: mode.as_str().to_owned(),
        },
        EnergyAction::Storm { state } => EnergyCommand::StormMode {
            enabled: state.enabled(),
        },
        EnergyAction::GridCharging { state } => EnergyCommand::GridImportExport {
            disallow_charge_from_grid_with_solar_installed: Some(!state.enabled()),
            customer_preferred_export_rule: None,
        },
        EnergyAction::OffGridReserve { percent } => {
            EnergyCommand::OffGridVehicleChargingReserve { percent }
        }
        EnergyAction::TimeOfUse { file } => {
            let contents = std::fs::read_to_string(&file)?;
            let tou_settings = serde_json::from_str(&contents)?;
            let reply = teslemetry
                .call_service(Service::TimeOfUse {
                    device_id: args.site_id.to_string(),
                    tou_settings,
                })
                .await?;
            return print_reply(&reply, global);
        }
    };

    let reply = teslemetry
        .energy_site(args.site_id)?
        .command(&command)
        .await?;
    print_reply(&reply, global)
}

fn print_reply(reply: &serde_json::Value, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(&global.output, reply, |_| "✓ Command sent".to_owned())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
