//! Status command: one-shot entity snapshot.

use serde::Serialize;
use tabled::Tabled;

use teslemetry_core::{Entity, EntityState, Platform, Teslemetry};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::error::CliError;
use crate::output;

use super::{device_id, matches_device};

/// Serializable view of one entity.
#[derive(Debug, Serialize)]
pub struct EntityView {
    pub device: String,
    pub key: &'static str,
    pub platform: Platform,
    pub unit: Option<&'static str>,
    pub available: bool,
    pub state: EntityState,
}

impl From<&Entity> for EntityView {
    fn from(e: &Entity) -> Self {
        Self {
            device: device_id(e),
            key: e.key(),
            platform: e.platform(),
            unit: e.description().unit,
            available: e.available(),
            state: e.state(),
        }
    }
}

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Entity")]
    key: &'static str,
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Unit")]
    unit: &'static str,
}

pub fn handle(
    teslemetry: &Teslemetry,
    args: &StatusArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let views: Vec<EntityView> = teslemetry
        .entities()
        .iter()
        .filter(|e| matches_device(e, args.device.as_deref()))
        .filter(|e| !args.available || e.available())
        .map(EntityView::from)
        .collect();

    if views.is_empty() {
        if let Some(device) = &args.device {
            return Err(CliError::NotFound {
                resource_type: "device".into(),
                identifier: device.clone(),
            });
        }
    }

    let out = output::render_list(
        &global.output,
        &views,
        |v| EntityRow {
            device: v.device.clone(),
            key: v.key,
            platform: v.platform.to_string(),
            state: output::format_state(&v.state, color),
            unit: v.unit.unwrap_or(""),
        },
        |v| format!("{}\t{}\t{}", v.device, v.key, output::format_state(&v.state, false)),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
