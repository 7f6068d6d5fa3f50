// ── Domain model ──
//
// Runtime handles for the products on a Teslemetry account. Each handle
// owns its coordinators and vendor API; entities and services reach the
// data through them.

pub mod energy;
pub mod vehicle;

use serde::Serialize;

pub use energy::{EnergySite, SiteComponents};
pub use vehicle::{Vehicle, VehicleState};

/// Identity shown for a device in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// VIN or energy site id.
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}
