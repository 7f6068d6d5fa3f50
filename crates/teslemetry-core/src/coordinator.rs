// ── Refresh coordinators ──
//
// Periodic pull of one product's state into its `DataMap`. Three
// flavours share a single state machine: vehicle data, energy live
// status, and energy site info. A refresh merges the flattened payload
// and never purges keys, so values pushed by the stream survive until
// the next poll overwrites them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::api::{EnergySiteApi, VehicleApi};
use crate::error::CoreError;
use crate::flatten::flatten;
use crate::model::VehicleState;
use crate::store::DataMap;

/// Energy live-status key whose value stays a nested map keyed by DIN.
pub const WALL_CONNECTORS: &str = "wall_connectors";

/// Which endpoint a coordinator polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CoordinatorKind {
    VehicleData,
    EnergyLive,
    EnergyInfo,
}

enum Source {
    Vehicle(Arc<dyn VehicleApi>),
    EnergyLive(Arc<dyn EnergySiteApi>),
    EnergyInfo(Arc<dyn EnergySiteApi>),
}

impl Source {
    fn kind(&self) -> CoordinatorKind {
        match self {
            Self::Vehicle(_) => CoordinatorKind::VehicleData,
            Self::EnergyLive(_) => CoordinatorKind::EnergyLive,
            Self::EnergyInfo(_) => CoordinatorKind::EnergyInfo,
        }
    }
}

/// Owns one product's data map and keeps it fresh.
///
/// Refreshes are serialized by an internal lock: a tick that fires while
/// a slow fetch is still running waits for it instead of overlapping.
pub struct RefreshCoordinator {
    /// VIN or energy site id, for logs.
    device: String,
    source: Source,
    data: Arc<DataMap>,
    update_interval: Duration,
    last_update_success: AtomicBool,
    auth_failed: AtomicBool,
    last_refresh: watch::Sender<Option<DateTime<Utc>>>,
    refresh_lock: Mutex<()>,
}

impl RefreshCoordinator {
    pub fn vehicle(vin: &str, api: Arc<dyn VehicleApi>, interval: Duration) -> Self {
        Self::new(vin.to_owned(), Source::Vehicle(api), interval)
    }

    pub fn energy_live(site_id: u64, api: Arc<dyn EnergySiteApi>, interval: Duration) -> Self {
        Self::new(site_id.to_string(), Source::EnergyLive(api), interval)
    }

    pub fn energy_info(site_id: u64, api: Arc<dyn EnergySiteApi>, interval: Duration) -> Self {
        Self::new(site_id.to_string(), Source::EnergyInfo(api), interval)
    }

    fn new(device: String, source: Source, update_interval: Duration) -> Self {
        let (last_refresh, _) = watch::channel(None);
        Self {
            device,
            source,
            data: Arc::new(DataMap::new()),
            update_interval,
            last_update_success: AtomicBool::new(false),
            auth_failed: AtomicBool::new(false),
            last_refresh,
            refresh_lock: Mutex::new(()),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn kind(&self) -> CoordinatorKind {
        self.source.kind()
    }

    pub fn data(&self) -> &Arc<DataMap> {
        &self.data
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Whether the most recent refresh succeeded. `false` until the first
    /// successful fetch.
    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::Acquire)
    }

    /// Set once a refresh is rejected for credentials. The periodic task
    /// has stopped and will not poll again until the account is
    /// re-authenticated and the integration set up anew.
    pub fn auth_failed(&self) -> bool {
        self.auth_failed.load(Ordering::Acquire)
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.borrow()
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Fetch, flatten and merge once.
    ///
    /// On failure the previous data stays in place and
    /// [`last_update_success`](Self::last_update_success) flips to `false`.
    /// Listeners are notified either way so availability can update.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let _guard = self.refresh_lock.lock().await;
        let started = Instant::now();

        let result = self.fetch().await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(values) => {
                let keys = values.len();
                self.data.merge(values);
                self.last_update_success.store(true, Ordering::Release);
                self.last_refresh.send_replace(Some(Utc::now()));
                self.data.notify();
                debug!(
                    coordinator = %self.kind(),
                    device = %self.device,
                    keys,
                    elapsed_ms,
                    "refresh complete"
                );
                Ok(())
            }
            Err(e) => {
                self.last_update_success.store(false, Ordering::Release);
                if e.is_auth() {
                    self.auth_failed.store(true, Ordering::Release);
                }
                self.data.notify();
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Map<String, Value>, CoreError> {
        match &self.source {
            Source::Vehicle(api) => match api.vehicle_data().await {
                Ok(body) => Ok(flatten(response(&body)?, &[])),
                Err(teslemetry_api::Error::VehicleOffline) => {
                    let mut offline = Map::new();
                    offline.insert(
                        "state".into(),
                        Value::String(VehicleState::Offline.to_string()),
                    );
                    Ok(offline)
                }
                Err(e) => Err(update_error(e)),
            },
            Source::EnergyLive(api) => {
                let body = api.live_status().await.map_err(update_error)?;
                let live = normalize_wall_connectors(response(&body)?);
                Ok(flatten(&live, &[WALL_CONNECTORS]))
            }
            Source::EnergyInfo(api) => {
                let body = api.site_info().await.map_err(update_error)?;
                Ok(flatten(response(&body)?, &[]))
            }
        }
    }

    /// Spawn the periodic refresh loop. The first tick is consumed, so the
    /// caller is expected to have run [`refresh`](Self::refresh) already.
    /// The loop ends on cancellation or on the first credential rejection.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(refresh_task(Arc::clone(self), cancel))
    }
}

// ── Background task ──────────────────────────────────────────────────

async fn refresh_task(coordinator: Arc<RefreshCoordinator>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(coordinator.update_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = coordinator.refresh().await {
                    if e.is_auth() {
                        error!(
                            coordinator = %coordinator.kind(),
                            device = %coordinator.device,
                            error = %e,
                            "refresh rejected credentials, polling stopped"
                        );
                        break;
                    }
                    warn!(
                        coordinator = %coordinator.kind(),
                        device = %coordinator.device,
                        error = %e,
                        "periodic refresh failed"
                    );
                }
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn response(body: &Value) -> Result<&Value, CoreError> {
    match body.get("response") {
        Some(value) if value.is_object() => Ok(value),
        _ => Err(CoreError::UpdateFailed {
            message: "response envelope missing".into(),
        }),
    }
}

/// Credential problems keep their identity; everything else is an
/// ordinary failed update.
fn update_error(err: teslemetry_api::Error) -> CoreError {
    match err {
        teslemetry_api::Error::InvalidToken | teslemetry_api::Error::SubscriptionRequired => {
            CoreError::from(err)
        }
        other => CoreError::UpdateFailed {
            message: other.message(),
        },
    }
}

/// Re-key `wall_connectors` from a list into a map keyed by DIN. A missing
/// list becomes an empty map.
fn normalize_wall_connectors(live: &Value) -> Value {
    let mut live = live.clone();
    if let Value::Object(ref mut map) = live {
        let by_din: Map<String, Value> = map
            .get(WALL_CONNECTORS)
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|wc| {
                        let din = wc.get("din")?.as_str()?;
                        Some((din.to_owned(), wc.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        map.insert(WALL_CONNECTORS.into(), Value::Object(by_din));
    }
    live
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::api::fake::{FakeSite, FakeVehicle};

    const VIN: &str = "LRW3F7EK4NC000001";

    fn vehicle_coordinator(api: Arc<FakeVehicle>) -> RefreshCoordinator {
        RefreshCoordinator::vehicle(VIN, api, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn vehicle_refresh_flattens_and_merges() {
        let api = Arc::new(FakeVehicle::with_state("online"));
        api.push_data(Ok(json!({
            "response": {
                "state": "online",
                "charge_state": { "battery_level": 80, "charging_state": "Charging" }
            }
        })));
        let coordinator = vehicle_coordinator(api);

        coordinator.refresh().await.unwrap();

        let data = coordinator.data();
        assert_eq!(data.get("charge_state_battery_level"), Some(json!(80)));
        assert_eq!(data.get_str("charge_state_charging_state").as_deref(), Some("Charging"));
        assert!(coordinator.last_update_success());
        assert!(coordinator.last_refresh().is_some());
    }

    #[tokio::test]
    async fn refresh_never_purges_streamed_keys() {
        let api = Arc::new(FakeVehicle::with_state("online"));
        api.push_data(Ok(json!({ "response": { "a": 1, "b": 2 } })));
        api.push_data(Ok(json!({ "response": { "a": 3 } })));
        let coordinator = vehicle_coordinator(api);

        coordinator.refresh().await.unwrap();
        coordinator.data().insert("streamed_only", json!(true));
        coordinator.refresh().await.unwrap();

        assert_eq!(
            Value::Object(coordinator.data().snapshot()),
            json!({ "a": 3, "b": 2, "streamed_only": true })
        );
    }

    #[tokio::test]
    async fn offline_vehicle_is_a_successful_refresh() {
        let api = Arc::new(FakeVehicle::with_state("offline"));
        api.push_data(Ok(json!({ "response": { "charge_state": { "battery_level": 55 } } })));
        api.push_data(Err(teslemetry_api::Error::VehicleOffline));
        let coordinator = vehicle_coordinator(api);

        coordinator.refresh().await.unwrap();
        coordinator.refresh().await.unwrap();

        assert!(coordinator.last_update_success());
        assert_eq!(coordinator.data().get_str("state").as_deref(), Some("offline"));
        assert_eq!(coordinator.data().get("charge_state_battery_level"), Some(json!(55)));
    }

    #[tokio::test]
    async fn failure_keeps_data_and_clears_success() {
        let api = Arc::new(FakeVehicle::with_state("online"));
        api.push_data(Ok(json!({ "response": { "state": "online" } })));
        api.push_data(Err(teslemetry_api::Error::Fleet {
            status: 500,
            message: "boom".into(),
        }));
        let coordinator = vehicle_coordinator(api);
        let rx = coordinator.data().subscribe();

        coordinator.refresh().await.unwrap();
        let err = coordinator.refresh().await.unwrap_err();

        assert!(matches!(err, CoreError::UpdateFailed { ref message } if message == "boom"));
        assert!(!coordinator.last_update_success());
        assert_eq!(coordinator.data().get_str("state").as_deref(), Some("online"));
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn auth_failures_surface_as_auth_errors() {
        let api = Arc::new(FakeVehicle::with_state("online"));
        api.push_data(Err(teslemetry_api::Error::InvalidToken));
        api.push_data(Err(teslemetry_api::Error::SubscriptionRequired));
        let coordinator = vehicle_coordinator(api);

        let first = coordinator.refresh().await.unwrap_err();
        let second = coordinator.refresh().await.unwrap_err();

        assert!(matches!(first, CoreError::Authentication { .. }));
        assert!(matches!(second, CoreError::SubscriptionRequired));
    }

    #[tokio::test]
    async fn energy_live_keys_wall_connectors_by_din() {
        let api = Arc::new(FakeSite::new());
        api.push_live(Ok(json!({
            "response": {
                "solar_power": 3200,
                "wall_connectors": [
                    { "din": "WC-1", "wall_connector_power": 7400, "wall_connector_state": 2 },
                    { "din": "WC-2", "wall_connector_power": 0, "wall_connector_state": 1 }
                ]
            }
        })));
        let coordinator =
            RefreshCoordinator::energy_live(42, api, Duration::from_secs(30));

        coordinator.refresh().await.unwrap();

        let data = coordinator.data();
        assert_eq!(data.get("solar_power"), Some(json!(3200)));
        assert_eq!(
            data.get(WALL_CONNECTORS).unwrap()["WC-1"]["wall_connector_power"],
            json!(7400)
        );
        assert_eq!(coordinator.kind(), CoordinatorKind::EnergyLive);
    }

    #[tokio::test]
    async fn energy_live_without_wall_connectors_stores_empty_map() {
        let api = Arc::new(FakeSite::new());
        api.push_live(Ok(json!({ "response": { "battery_power": -500 } })));
        let coordinator =
            RefreshCoordinator::energy_live(42, api, Duration::from_secs(30));

        coordinator.refresh().await.unwrap();

        assert_eq!(coordinator.data().get(WALL_CONNECTORS), Some(json!({})));
    }

    #[tokio::test]
    async fn energy_info_flattens_nested_settings() {
        let api = Arc::new(FakeSite::new());
        api.push_info(Ok(json!({
            "response": {
                "site_name": "Home",
                "user_settings": { "storm_mode_enabled": true },
                "components": { "battery": true }
            }
        })));
        let coordinator =
            RefreshCoordinator::energy_info(42, api, Duration::from_secs(300));

        coordinator.refresh().await.unwrap();

        let data = coordinator.data();
        assert_eq!(data.get("user_settings_storm_mode_enabled"), Some(json!(true)));
        assert_eq!(data.get("components_battery"), Some(json!(true)));
        assert_eq!(coordinator.update_interval(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn missing_envelope_is_update_failure() {
        let api = Arc::new(FakeSite::new());
        api.push_info(Ok(json!({ "error": "nope" })));
        let coordinator =
            RefreshCoordinator::energy_info(42, api, Duration::from_secs(300));

        let err = coordinator.refresh().await.unwrap_err();
        assert!(matches!(err, CoreError::UpdateFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_task_polls_on_interval() {
        let api = Arc::new(FakeVehicle::with_state("online"));
        api.push_data(Ok(json!({ "response": { "tick": 1 } })));
        api.push_data(Ok(json!({ "response": { "tick": 2 } })));
        let coordinator = Arc::new(vehicle_coordinator(api));
        let cancel = CancellationToken::new();

        let handle = coordinator.spawn(cancel.clone());
        let mut rx = coordinator.data().subscribe();

        rx.changed().await.unwrap();
        assert_eq!(coordinator.data().get("tick"), Some(json!(1)));
        rx.changed().await.unwrap();
        assert_eq!(coordinator.data().get("tick"), Some(json!(2)));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_token_stops_periodic_polling() {
        let api = Arc::new(FakeVehicle::with_state("online"));
        for _ in 0..10 {
            api.push_data(Err(teslemetry_api::Error::InvalidToken));
        }
        let coordinator = Arc::new(vehicle_coordinator(Arc::clone(&api)));
        let cancel = CancellationToken::new();

        let handle = coordinator.spawn(cancel.clone());
        tokio::time::sleep(Duration::from_secs(95)).await;

        assert_eq!(api.data_calls.load(Ordering::SeqCst), 1);
        assert!(coordinator.auth_failed());
        assert!(!coordinator.last_update_success());
        assert!(handle.is_finished());
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_keeps_polling() {
        let api = Arc::new(FakeVehicle::with_state("online"));
        api.push_data(Err(teslemetry_api::Error::Fleet {
            status: 500,
            message: "boom".into(),
        }));
        let coordinator = Arc::new(vehicle_coordinator(Arc::clone(&api)));
        let cancel = CancellationToken::new();

        let handle = coordinator.spawn(cancel.clone());
        tokio::time::sleep(Duration::from_secs(65)).await;

        assert_eq!(api.data_calls.load(Ordering::SeqCst), 2);
        assert!(!coordinator.auth_failed());
        assert!(coordinator.last_update_success());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_refresh_does_not_burst_catch_up_ticks() {
        let mut api = FakeVehicle::with_state("online");
        api.data_delay = Duration::from_secs(70);
        let api = Arc::new(api);
        let coordinator = Arc::new(vehicle_coordinator(Arc::clone(&api)));
        let cancel = CancellationToken::new();

        // Tick at 30s runs until 100s; the next fetch waits for 130s.
        let handle = coordinator.spawn(cancel.clone());
        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(api.data_calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.data_calls.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
