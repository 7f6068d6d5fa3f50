//! State synchronization between the Teslemetry API and its consumers.
//!
//! This crate owns the polling, streaming and command logic for the
//! `teslemetry` workspace:
//!
//! - **[`Teslemetry`]**: facade managing the full lifecycle.
//!   [`setup()`](Teslemetry::setup) discovers products, runs the first
//!   refresh, spawns periodic refresh tasks and attaches the telemetry
//!   stream; [`unload()`](Teslemetry::unload) tears it all down.
//!
//! - **[`RefreshCoordinator`]**: periodic pull of one product's state
//!   into a shared [`DataMap`]. Vehicle data and energy live status poll
//!   every 30 s, energy site info every 5 min.
//!
//! - **[`StreamReconciler`]**: folds pushed telemetry into the same data
//!   maps and emits vehicle alerts at most once.
//!
//! - **[`WakeController`]**: per-vehicle wake-up with a bounded retry
//!   schedule, run before every vehicle command.
//!
//! - **Commands** ([`VehicleCommand`], [`EnergyCommand`]): typed writes,
//!   executed through [`execute`] / [`execute_vehicle_command`].
//!
//! - **Entities** ([`Entity`]): static description tables bound to
//!   devices, rendering sensors, binary sensors and switches.

pub mod api;
pub mod command;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod flatten;
pub mod model;
pub mod services;
pub mod store;
pub mod stream;
pub mod wake;

// ── Primary re-exports ──────────────────────────────────────────────
pub use api::{EnergySiteApi, VehicleApi};
pub use command::{
    ACCEPTABLE_REASONS, EnergyCommand, Trunk, VehicleCommand, execute, execute_vehicle_command,
};
pub use config::{IntegrationConfig, WakePolicy};
pub use context::{Product, Teslemetry, discover_products};
pub use coordinator::{CoordinatorKind, RefreshCoordinator};
pub use entity::{Entity, EntityDescription, EntityScope, EntityState, Platform};
pub use error::CoreError;
pub use flatten::flatten;
pub use model::{DeviceInfo, EnergySite, SiteComponents, Vehicle, VehicleState};
pub use services::Service;
pub use store::{DataMap, FieldStream};
pub use stream::{NoticeKind, StreamReconciler, TelemetryEvent, VehicleAlert};
pub use wake::WakeController;
