// ── Entities ──
//
// An entity is one description bound to one device. It reads its value
// from the owning coordinator's data map, reports availability from the
// coordinator's last refresh, and for switches dispatches a command
// before writing the new value back optimistically.

pub mod description;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::coordinator::{RefreshCoordinator, WALL_CONNECTORS};
use crate::error::CoreError;
use crate::model::{EnergySite, Vehicle};
use crate::store::{DataMap, FieldStream};

pub use description::{
    ENERGY_INFO_DESCRIPTIONS, ENERGY_LIVE_DESCRIPTIONS, EntityDescription, Platform,
    SwitchAction, Transform, VEHICLE_DESCRIPTIONS, WALL_CONNECTOR_DESCRIPTIONS,
    streaming_field_map,
};

/// Which device, and which of its coordinators, an entity reads from.
#[derive(Clone)]
pub enum EntityScope {
    Vehicle(Arc<Vehicle>),
    EnergyLive(Arc<EnergySite>),
    EnergyInfo(Arc<EnergySite>),
    WallConnector { site: Arc<EnergySite>, din: String },
}

/// Rendered value, tagged by platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "platform", content = "value", rename_all = "snake_case")]
pub enum EntityState {
    Sensor(Option<Value>),
    BinarySensor(Option<bool>),
    Switch(Option<bool>),
}

/// One description bound to one device.
#[derive(Clone)]
pub struct Entity {
    scope: EntityScope,
    description: &'static EntityDescription,
}

impl Entity {
    pub fn new(scope: EntityScope, description: &'static EntityDescription) -> Self {
        Self { scope, description }
    }

    /// Every entity for a vehicle.
    pub fn for_vehicle(vehicle: &Arc<Vehicle>) -> Vec<Self> {
        VEHICLE_DESCRIPTIONS
            .iter()
            .map(|d| Self::new(EntityScope::Vehicle(Arc::clone(vehicle)), d))
            .collect()
    }

    /// Every entity for an energy site, including one set per wall
    /// connector currently present in live data.
    pub fn for_energy_site(site: &Arc<EnergySite>) -> Vec<Self> {
        let mut entities: Vec<Self> = ENERGY_LIVE_DESCRIPTIONS
            .iter()
            .map(|d| Self::new(EntityScope::EnergyLive(Arc::clone(site)), d))
            .chain(
                ENERGY_INFO_DESCRIPTIONS
                    .iter()
                    .map(|d| Self::new(EntityScope::EnergyInfo(Arc::clone(site)), d)),
            )
            .collect();

        if let Some(Value::Object(connectors)) = site.live().data().get(WALL_CONNECTORS) {
            for din in connectors.keys() {
                entities.extend(WALL_CONNECTOR_DESCRIPTIONS.iter().map(|d| {
                    Self::new(
                        EntityScope::WallConnector {
                            site: Arc::clone(site),
                            din: din.clone(),
                        },
                        d,
                    )
                }));
            }
        }
        entities
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn description(&self) -> &'static EntityDescription {
        self.description
    }

    pub fn key(&self) -> &'static str {
        self.description.key
    }

    pub fn platform(&self) -> Platform {
        self.description.platform
    }

    pub fn scope(&self) -> &EntityScope {
        &self.scope
    }

    /// Stable id: device identifier plus key.
    pub fn unique_id(&self) -> String {
        match &self.scope {
            EntityScope::Vehicle(v) => format!("{}-{}", v.vin(), self.key()),
            EntityScope::EnergyLive(s) | EntityScope::EnergyInfo(s) => {
                format!("{}-{}", s.site_id(), self.key())
            }
            EntityScope::WallConnector { site, din } => {
                format!("{}-{din}-{}", site.site_id(), self.key())
            }
        }
    }

    // ── Data ─────────────────────────────────────────────────────────

    fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        match &self.scope {
            EntityScope::Vehicle(v) => v.coordinator(),
            EntityScope::EnergyLive(s) | EntityScope::WallConnector { site: s, .. } => s.live(),
            EntityScope::EnergyInfo(s) => s.info(),
        }
    }

    fn data(&self) -> &Arc<DataMap> {
        self.coordinator().data()
    }

    /// The untransformed value, if present.
    pub fn raw(&self) -> Option<Value> {
        match &self.scope {
            EntityScope::WallConnector { din, .. } => self
                .data()
                .get(WALL_CONNECTORS)?
                .get(din)?
                .get(self.key())
                .cloned(),
            _ => self.data().get(self.key()),
        }
    }

    /// Available while the last refresh succeeded and the value exists.
    pub fn available(&self) -> bool {
        self.coordinator().last_update_success() && self.raw().is_some()
    }

    pub fn state(&self) -> EntityState {
        let value = self.description.transform.apply(self.raw().as_ref());
        match self.description.platform {
            Platform::Sensor => EntityState::Sensor(value),
            Platform::BinarySensor => EntityState::BinarySensor(value.and_then(|v| v.as_bool())),
            Platform::Switch => EntityState::Switch(value.and_then(|v| v.as_bool())),
        }
    }

    /// Fires whenever the owning coordinator notifies.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.data().subscribe()
    }

    /// Direct stream listener for entities with a streaming field.
    pub fn subscribe_stream(&self) -> Option<FieldStream> {
        let field = self.description.streaming_field?;
        match &self.scope {
            EntityScope::Vehicle(v) => Some(v.data().subscribe_field(field)),
            _ => None,
        }
    }

    /// Write the entity's key and notify. Wall connector values live
    /// inside a nested map and are not writable.
    pub fn set(&self, value: Value) -> Result<(), CoreError> {
        match &self.scope {
            EntityScope::WallConnector { .. } => Err(CoreError::Unsupported {
                operation: format!("writing wall connector value {}", self.key()),
            }),
            _ => {
                self.data().set(self.key(), value);
                Ok(())
            }
        }
    }

    // ── Switch ───────────────────────────────────────────────────────

    pub async fn turn_on(&self) -> Result<(), CoreError> {
        self.toggle(true).await
    }

    pub async fn turn_off(&self) -> Result<(), CoreError> {
        self.toggle(false).await
    }

    async fn toggle(&self, on: bool) -> Result<(), CoreError> {
        let action = self.description.switch.ok_or_else(|| CoreError::Unsupported {
            operation: format!("toggling {}", self.key()),
        })?;

        match &self.scope {
            EntityScope::Vehicle(vehicle) => {
                let command = action.vehicle_command(on).ok_or_else(|| unsupported(self))?;
                vehicle.command(&command).await?;
            }
            EntityScope::EnergyInfo(site) | EntityScope::EnergyLive(site) => {
                let command = action.energy_command(on).ok_or_else(|| unsupported(self))?;
                site.command(&command).await?;
            }
            EntityScope::WallConnector { .. } => return Err(unsupported(self)),
        }

        self.set(action.stored_value(on))
    }
}

fn unsupported(entity: &Entity) -> CoreError {
    CoreError::Unsupported {
        operation: format!("toggling {}", entity.unique_id()),
    }
}
