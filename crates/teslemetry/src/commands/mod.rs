//! Command dispatch: bridges CLI args to the running context and output.

pub mod config_cmd;
pub mod energy;
pub mod status;
pub mod vehicle;
pub mod watch;

use teslemetry_core::{Entity, EntityScope, Teslemetry};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch an account-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    teslemetry: &Teslemetry,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Status(args) => status::handle(teslemetry, &args, global),
        Command::Watch(args) => watch::handle(teslemetry, &args, global).await,
        Command::Command(args) => vehicle::handle(teslemetry, args, global).await,
        Command::Energy(args) => energy::handle(teslemetry, args, global).await,
        Command::Wake { vin } => vehicle::wake(teslemetry, &vin, global).await,
        // Handled before the context is built
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}

/// Identifier of the device owning `entity`: VIN, site id, or wall
/// connector DIN.
pub fn device_id(entity: &Entity) -> String {
    match entity.scope() {
        EntityScope::Vehicle(v) => v.vin().to_owned(),
        EntityScope::EnergyLive(s) | EntityScope::EnergyInfo(s) => s.site_id().to_string(),
        EntityScope::WallConnector { din, .. } => din.clone(),
    }
}

/// Whether `entity` belongs to `filter` (a VIN or site id). Wall
/// connectors match their site.
pub fn matches_device(entity: &Entity, filter: Option<&str>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    match entity.scope() {
        EntityScope::Vehicle(v) => v.vin() == filter,
        EntityScope::EnergyLive(s) | EntityScope::EnergyInfo(s) => {
            s.site_id().to_string() == filter
        }
        EntityScope::WallConnector { site, din } => {
            din == filter || site.site_id().to_string() == filter
        }
    }
}
