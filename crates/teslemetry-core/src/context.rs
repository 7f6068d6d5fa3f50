// ── Integration context ──
//
// Full lifecycle for one Teslemetry account: discover products, run the
// first refresh of every coordinator, spawn the periodic refresh tasks,
// and attach the telemetry stream where vehicles support it.

use std::sync::Arc;

use futures_util::future::try_join_all;
use serde::Deserialize;
use serde_json::Value;
use teslemetry_api::{Metadata, ReconnectConfig, StreamHandle, TeslemetryClient, TransportConfig};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::IntegrationConfig;
use crate::coordinator::RefreshCoordinator;
use crate::entity::Entity;
use crate::error::CoreError;
use crate::model::{EnergySite, SiteComponents, Vehicle};
use crate::stream::{StreamReconciler, VehicleAlert};

const ALERT_CHANNEL_SIZE: usize = 256;

/// Scope granting read access to vehicle data.
pub const SCOPE_VEHICLE_DATA: &str = "vehicle_device_data";
/// Scope granting read access to energy site data.
pub const SCOPE_ENERGY_DATA: &str = "energy_device_data";

// ── Product discovery ────────────────────────────────────────────────

/// One usable entry from the products listing.
#[derive(Debug, Clone, PartialEq)]
pub enum Product {
    Vehicle {
        vin: String,
        display_name: String,
    },
    EnergySite {
        site_id: u64,
        site_name: String,
        components: SiteComponents,
    },
}

#[derive(Deserialize)]
struct RawProduct {
    #[serde(default)]
    vin: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    energy_site_id: Option<u64>,
    #[serde(default)]
    site_name: Option<String>,
    #[serde(default)]
    components: Option<SiteComponents>,
}

/// Pick the products this token may read.
///
/// Vehicles need the vehicle data scope and energy sites the energy data
/// scope. Sites with no battery, solar or wall connectors are skipped.
pub fn discover_products(metadata: &Metadata, products: &Value) -> Vec<Product> {
    let vehicle_scope = metadata.has_scope(SCOPE_VEHICLE_DATA);
    let energy_scope = metadata.has_scope(SCOPE_ENERGY_DATA);

    let Some(entries) = products.get("response").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let raw: RawProduct = match serde_json::from_value(entry.clone()) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(error = %e, "skipping malformed product entry");
                    return None;
                }
            };
            if let Some(vin) = raw.vin {
                if !vehicle_scope {
                    debug!(%vin, "skipping vehicle, token lacks {SCOPE_VEHICLE_DATA}");
                    return None;
                }
                let display_name = raw.display_name.unwrap_or_else(|| vin.clone());
                return Some(Product::Vehicle { vin, display_name });
            }

            let site_id = raw.energy_site_id?;
            if !energy_scope {
                debug!(site_id, "skipping energy site, token lacks {SCOPE_ENERGY_DATA}");
                return None;
            }
            let components = raw.components.unwrap_or_default();
            if !components.has_any() {
                debug!(site_id, "skipping energy site without battery, solar or wall connectors");
                return None;
            }
            Some(Product::EnergySite {
                site_id,
                site_name: raw.site_name.unwrap_or_else(|| site_id.to_string()),
                components,
            })
        })
        .collect()
}

// ── Teslemetry ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<Inner>`. Owns every vehicle and energy
/// site on the account together with their background tasks.
#[derive(Clone)]
pub struct Teslemetry {
    inner: Arc<Inner>,
}

struct Inner {
    config: IntegrationConfig,
    vehicles: Vec<Arc<Vehicle>>,
    energy_sites: Vec<Arc<EnergySite>>,
    alert_tx: broadcast::Sender<Arc<VehicleAlert>>,
    cancel: CancellationToken,
    stream: Mutex<Option<StreamHandle>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Teslemetry {
    /// Discover products, refresh them once, then start background work.
    ///
    /// Fails if the token is rejected or any first refresh fails.
    /// Streaming problems are logged and leave the integration on polling.
    pub async fn setup(config: IntegrationConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            timeout: config.timeout,
            ..TransportConfig::default()
        };
        let client =
            TeslemetryClient::from_access_token(&config.base_url, &config.access_token, &transport)?;

        let (metadata, products) = tokio::try_join!(client.metadata(), client.products())?;
        debug!(scopes = ?metadata.scopes, "token metadata");

        let mut vehicles = Vec::new();
        let mut energy_sites = Vec::new();
        for product in discover_products(&metadata, &products) {
            match product {
                Product::Vehicle { vin, display_name } => {
                    let api = Arc::new(client.vehicle(vin.clone()));
                    vehicles.push(Arc::new(Vehicle::new(vin, display_name, api, &config)));
                }
                Product::EnergySite {
                    site_id,
                    site_name,
                    components,
                } => {
                    let api = Arc::new(client.energy_site(site_id));
                    energy_sites.push(Arc::new(EnergySite::new(
                        site_id, site_name, components, api, &config,
                    )));
                }
            }
        }

        let teslemetry = Self::new(config, vehicles, energy_sites);
        teslemetry.start().await?;
        Ok(teslemetry)
    }

    /// Assemble from already-built devices. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(
        config: IntegrationConfig,
        vehicles: Vec<Arc<Vehicle>>,
        energy_sites: Vec<Arc<EnergySite>>,
    ) -> Self {
        let (alert_tx, _) = broadcast::channel(ALERT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(Inner {
                config,
                vehicles,
                energy_sites,
                alert_tx,
                cancel: CancellationToken::new(),
                stream: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// First refresh, periodic refresh tasks, then streaming if enabled.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.first_refresh().await?;
        self.spawn_refresh_tasks().await;
        if self.inner.config.streaming_enabled {
            self.connect_stream().await;
        }
        info!(
            vehicles = self.inner.vehicles.len(),
            energy_sites = self.inner.energy_sites.len(),
            "teslemetry ready"
        );
        Ok(())
    }

    /// Cancel background tasks and close the stream.
    pub async fn unload(&self) {
        self.inner.cancel.cancel();

        if let Some(stream) = self.inner.stream.lock().await.take() {
            stream.shutdown();
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("teslemetry unloaded");
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &IntegrationConfig {
        &self.inner.config
    }

    pub fn vehicles(&self) -> &[Arc<Vehicle>] {
        &self.inner.vehicles
    }

    pub fn energy_sites(&self) -> &[Arc<EnergySite>] {
        &self.inner.energy_sites
    }

    pub fn vehicle(&self, vin: &str) -> Result<&Arc<Vehicle>, CoreError> {
        self.inner
            .vehicles
            .iter()
            .find(|v| v.vin() == vin)
            .ok_or_else(|| CoreError::VehicleNotFound { vin: vin.to_owned() })
    }

    pub fn energy_site(&self, site_id: u64) -> Result<&Arc<EnergySite>, CoreError> {
        self.inner
            .energy_sites
            .iter()
            .find(|s| s.site_id() == site_id)
            .ok_or_else(|| CoreError::EnergySiteNotFound {
                site_id: site_id.to_string(),
            })
    }

    /// Every entity across every device.
    pub fn entities(&self) -> Vec<Entity> {
        self.inner
            .vehicles
            .iter()
            .flat_map(Entity::for_vehicle)
            .chain(self.inner.energy_sites.iter().flat_map(Entity::for_energy_site))
            .collect()
    }

    /// Subscribe to vehicle alerts and errors raised over the stream.
    pub fn alerts(&self) -> broadcast::Receiver<Arc<VehicleAlert>> {
        self.inner.alert_tx.subscribe()
    }

    fn coordinators(&self) -> Vec<Arc<RefreshCoordinator>> {
        let vehicles = self.inner.vehicles.iter().map(|v| Arc::clone(v.coordinator()));
        let sites = self
            .inner
            .energy_sites
            .iter()
            .flat_map(|s| [Arc::clone(s.live()), Arc::clone(s.info())]);
        vehicles.chain(sites).collect()
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Refresh every coordinator concurrently. The first failure wins.
    pub async fn first_refresh(&self) -> Result<(), CoreError> {
        let coordinators = self.coordinators();
        try_join_all(coordinators.iter().map(|c| c.refresh())).await?;
        debug!(coordinators = coordinators.len(), "first refresh complete");
        Ok(())
    }

    async fn spawn_refresh_tasks(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        for coordinator in self.coordinators() {
            handles.push(coordinator.spawn(self.inner.cancel.clone()));
        }
    }

    // ── Streaming ────────────────────────────────────────────────────

    async fn connect_stream(&self) {
        let config = &self.inner.config;
        let url = match Url::parse(&config.stream_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "invalid stream URL, polling only");
                return;
            }
        };

        match StreamHandle::connect(
            url,
            &config.access_token,
            ReconnectConfig::default(),
            self.inner.cancel.child_token(),
        ) {
            Ok(handle) => self.attach_stream(handle).await,
            Err(e) => warn!(error = %e, "telemetry stream unavailable, polling only"),
        }
    }

    /// Check each vehicle's telemetry configuration and route the stream
    /// to those that have one. Vehicles without one stay poll-only; that
    /// is logged once per vehicle here and never again.
    pub async fn attach_stream(&self, handle: StreamHandle) {
        let mut streaming = Vec::new();
        for vehicle in &self.inner.vehicles {
            match vehicle.api().stream_config().await {
                Ok(config) => {
                    vehicle.set_stream_config(config.config);
                    vehicle.set_streaming(true);
                    streaming.push(Arc::clone(vehicle));
                }
                Err(teslemetry_api::Error::VehicleNotConfigured { .. }) => {
                    warn!(vin = %vehicle.vin(), "vehicle not configured for streaming, polling only");
                }
                Err(e) => {
                    warn!(vin = %vehicle.vin(), error = %e, "stream config check failed, polling only");
                }
            }
        }

        if streaming.is_empty() {
            handle.shutdown();
            return;
        }

        let rx = handle.subscribe();
        let reconciler = StreamReconciler::new(streaming, self.inner.alert_tx.clone());
        let task = tokio::spawn(reconciler.run(rx, self.inner.cancel.clone()));

        self.inner.task_handles.lock().await.push(task);
        *self.inner.stream.lock().await = Some(handle);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use teslemetry_api::StreamMessage;

    use super::*;
    use crate::api::fake::{FakeSite, FakeVehicle};

    fn config() -> IntegrationConfig {
        IntegrationConfig::new("token".to_string().into())
    }

    fn metadata(scopes: &[&str]) -> Metadata {
        serde_json::from_value(json!({ "scopes": scopes })).unwrap()
    }

    fn products() -> Value {
        json!({
            "response": [
                { "vin": "5YJ3E1EA7KF000001", "display_name": "Blue" },
                { "energy_site_id": 1, "site_name": "Home", "components": { "battery": true } },
                { "energy_site_id": 2, "site_name": "Empty", "components": { "wall_connectors": [] } },
                { "something_else": true }
            ]
        })
    }

    #[test]
    fn discovery_respects_scopes_and_components() {
        let all = discover_products(&metadata(&[SCOPE_VEHICLE_DATA, SCOPE_ENERGY_DATA]), &products());
        assert_eq!(all.len(), 2);
        assert!(matches!(&all[0], Product::Vehicle { display_name, .. } if display_name == "Blue"));
        assert!(matches!(&all[1], Product::EnergySite { site_id: 1, .. }));

        let vehicles_only = discover_products(&metadata(&[SCOPE_VEHICLE_DATA]), &products());
        assert_eq!(vehicles_only.len(), 1);

        assert!(discover_products(&metadata(&[]), &products()).is_empty());
    }

    #[test]
    fn null_components_skip_the_site_without_dropping_others() {
        let listing = json!({
            "response": [
                { "energy_site_id": 7, "site_name": "Cabin", "components": null },
                { "energy_site_id": 8, "site_name": "Barn", "components": { "solar": true } },
                { "vin": 42 }
            ]
        });

        let found = discover_products(&metadata(&[SCOPE_VEHICLE_DATA, SCOPE_ENERGY_DATA]), &listing);

        assert_eq!(found.len(), 1);
        assert!(matches!(&found[0], Product::EnergySite { site_id: 8, components, .. } if components.solar));
    }

    fn vehicle(vin: &str, api: FakeVehicle) -> Arc<Vehicle> {
        Arc::new(Vehicle::new(vin, vin, Arc::new(api), &config()))
    }

    #[tokio::test]
    async fn first_refresh_runs_every_coordinator() {
        let car = FakeVehicle::with_state("online");
        car.push_data(Ok(json!({ "response": { "state": "online" } })));
        let site_api = Arc::new(FakeSite::new());
        site_api.push_live(Ok(json!({ "response": { "solar_power": 10 } })));
        site_api.push_info(Ok(json!({ "response": { "site_name": "Home" } })));
        let site = Arc::new(EnergySite::new(
            1,
            "Home",
            SiteComponents::default(),
            site_api,
            &config(),
        ));

        let teslemetry = Teslemetry::new(config(), vec![vehicle("VIN1", car)], vec![site]);
        tokio_test::assert_ok!(teslemetry.first_refresh().await);

        assert!(teslemetry.coordinators().iter().all(|c| c.last_update_success()));
        assert_eq!(
            teslemetry.energy_site(1).unwrap().info().data().get_str("site_name").as_deref(),
            Some("Home")
        );
    }

    #[tokio::test]
    async fn first_refresh_failure_is_reported() {
        let car = FakeVehicle::with_state("online");
        car.push_data(Err(teslemetry_api::Error::InvalidToken));
        let teslemetry = Teslemetry::new(config(), vec![vehicle("VIN1", car)], vec![]);

        let err = tokio_test::assert_err!(teslemetry.first_refresh().await);
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn stream_only_reaches_configured_vehicles() {
        let configured = vehicle("VIN1", FakeVehicle::with_state("online"));
        let mut unconfigured_api = FakeVehicle::with_state("online");
        unconfigured_api.stream_configured = false;
        let unconfigured = vehicle("VIN2", unconfigured_api);

        let teslemetry = Teslemetry::new(
            config(),
            vec![Arc::clone(&configured), Arc::clone(&unconfigured)],
            vec![],
        );
        let (tx, _) = broadcast::channel::<Arc<StreamMessage>>(16);
        teslemetry
            .attach_stream(StreamHandle::from_sender(&tx, CancellationToken::new()))
            .await;

        assert!(configured.is_streaming());
        assert!(configured.stream_config().is_some());
        assert!(!unconfigured.is_streaming());

        let mut version = configured.data().subscribe();
        for vin in ["VIN2", "VIN1"] {
            let frame: StreamMessage =
                serde_json::from_value(json!({ "vin": vin, "state": "asleep" })).unwrap();
            tx.send(Arc::new(frame)).unwrap();
        }
        version.changed().await.unwrap();

        assert_eq!(configured.data().get_str("state").as_deref(), Some("asleep"));
        assert!(unconfigured.data().get("state").is_none());

        teslemetry.unload().await;
    }

    #[tokio::test]
    async fn lookups_report_missing_devices() {
        let teslemetry = Teslemetry::new(config(), vec![], vec![]);
        assert!(matches!(
            teslemetry.vehicle("NOPE"),
            Err(CoreError::VehicleNotFound { .. })
        ));
        assert!(matches!(
            teslemetry.energy_site(9),
            Err(CoreError::EnergySiteNotFound { .. })
        ));
    }
}
