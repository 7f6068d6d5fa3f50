// ── Energy site handle ──

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DeviceInfo;
use crate::api::EnergySiteApi;
use crate::command::{EnergyCommand, execute};
use crate::config::IntegrationConfig;
use crate::coordinator::RefreshCoordinator;
use crate::error::CoreError;

/// Hardware present at a site, from the products listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteComponents {
    #[serde(default)]
    pub battery: bool,
    #[serde(default)]
    pub solar: bool,
    #[serde(default)]
    pub grid: bool,
    #[serde(default, rename = "wall_connectors", deserialize_with = "non_empty")]
    pub wall_connectors: bool,
}

impl SiteComponents {
    /// A site with none of battery, solar or wall connectors has nothing
    /// to report.
    pub fn has_any(self) -> bool {
        self.battery || self.solar || self.wall_connectors
    }
}

/// `wall_connectors` is a list in the products listing; present and
/// non-empty means the site has at least one.
fn non_empty<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(list) => !list.is_empty(),
        Value::Bool(b) => b,
        _ => false,
    })
}

/// One energy site on the account.
pub struct EnergySite {
    site_id: u64,
    site_name: String,
    components: SiteComponents,
    api: Arc<dyn EnergySiteApi>,
    live: Arc<RefreshCoordinator>,
    info: Arc<RefreshCoordinator>,
}

impl EnergySite {
    pub fn new(
        site_id: u64,
        site_name: impl Into<String>,
        components: SiteComponents,
        api: Arc<dyn EnergySiteApi>,
        config: &IntegrationConfig,
    ) -> Self {
        let live = Arc::new(RefreshCoordinator::energy_live(
            site_id,
            Arc::clone(&api),
            config.energy_live_interval,
        ));
        let info = Arc::new(RefreshCoordinator::energy_info(
            site_id,
            Arc::clone(&api),
            config.energy_info_interval,
        ));
        Self {
            site_id,
            site_name: site_name.into(),
            components,
            api,
            live,
            info,
        }
    }

    pub fn site_id(&self) -> u64 {
        self.site_id
    }

    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    pub fn components(&self) -> SiteComponents {
        self.components
    }

    pub fn device_info(&self) -> DeviceInfo {
        let model = match (self.components.battery, self.components.solar) {
            (true, _) => Some("Powerwall".to_owned()),
            (false, true) => Some("Solar".to_owned()),
            (false, false) => None,
        };
        DeviceInfo {
            identifier: self.site_id.to_string(),
            name: self.site_name.clone(),
            manufacturer: "Tesla",
            model,
            serial_number: None,
        }
    }

    pub fn api(&self) -> &Arc<dyn EnergySiteApi> {
        &self.api
    }

    pub fn live(&self) -> &Arc<RefreshCoordinator> {
        &self.live
    }

    pub fn info(&self) -> &Arc<RefreshCoordinator> {
        &self.info
    }

    /// Send a site command. Energy sites never sleep, so there is no wake.
    pub async fn command(&self, command: &EnergyCommand) -> Result<Value, CoreError> {
        execute(self.api.command(command.name(), &command.body())).await
    }
}
