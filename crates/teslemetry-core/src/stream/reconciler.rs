// ── Stream reconciler ──
//
// Applies telemetry events to the vehicles that own them. Field updates
// are merged into the data map and pushed straight to per-field
// listeners, without the bulk version bump a poll causes. Alerts and
// errors are emitted at most once, gated by a per-vehicle watermark.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use teslemetry_api::StreamMessage;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::{Notice, NoticeKind, TelemetryEvent, fresh_notices};
use crate::entity::streaming_field_map;
use crate::flatten::flatten;
use crate::model::Vehicle;

/// Alert or error raised by a vehicle, emitted once.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleAlert {
    pub vin: String,
    pub kind: NoticeKind,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    /// The raw entry as the vehicle sent it.
    pub body: Value,
}

/// Routes stream frames to vehicles by VIN.
pub struct StreamReconciler {
    vehicles: HashMap<String, Arc<Vehicle>>,
    field_keys: HashMap<&'static str, &'static str>,
    alert_tx: broadcast::Sender<Arc<VehicleAlert>>,
}

impl StreamReconciler {
    pub fn new(
        vehicles: impl IntoIterator<Item = Arc<Vehicle>>,
        alert_tx: broadcast::Sender<Arc<VehicleAlert>>,
    ) -> Self {
        Self {
            vehicles: vehicles
                .into_iter()
                .map(|v| (v.vin().to_owned(), v))
                .collect(),
            field_keys: streaming_field_map(),
            alert_tx,
        }
    }

    /// Apply one frame. Frames for vehicles not registered here are
    /// ignored.
    pub fn on_message(&self, message: &StreamMessage) {
        let Some(vehicle) = self.vehicles.get(&message.vin) else {
            debug!(vin = %message.vin, "stream frame for unknown vehicle");
            return;
        };
        for event in TelemetryEvent::parse(message) {
            self.on_event(vehicle, event);
        }
    }

    /// Apply one event to `vehicle`.
    pub fn on_event(&self, vehicle: &Vehicle, event: TelemetryEvent) {
        match event {
            TelemetryEvent::Alerts(notices) => {
                self.emit_fresh(vehicle, NoticeKind::Alert, notices);
            }
            TelemetryEvent::Errors(notices) => {
                self.emit_fresh(vehicle, NoticeKind::Error, notices);
            }
            TelemetryEvent::Data(fields) => self.apply_fields(vehicle, fields),
            TelemetryEvent::State(state) => {
                debug!(vin = %vehicle.vin(), %state, "stream state update");
                vehicle.data().set("state", Value::String(state));
            }
            TelemetryEvent::VehicleData(document) => {
                let data = vehicle.data();
                data.merge(flatten(&document, &[]));
                data.notify();
            }
            TelemetryEvent::Config(config) => vehicle.set_stream_config(config),
        }
    }

    fn apply_fields(&self, vehicle: &Vehicle, fields: Map<String, Value>) {
        let data = vehicle.data();
        for (field, value) in fields {
            let key = self
                .field_keys
                .get(field.as_str())
                .map_or_else(|| field.clone(), |k| (*k).to_owned());
            data.insert(key, value.clone());
            data.publish_field(&field, &value);
        }
    }

    fn emit_fresh(&self, vehicle: &Vehicle, kind: NoticeKind, notices: Vec<Notice>) {
        let watermark = match kind {
            NoticeKind::Alert => vehicle.last_alert(),
            NoticeKind::Error => vehicle.last_error(),
        };
        let fresh = fresh_notices(notices, watermark);
        let Some(newest) = fresh.first().map(|n| n.timestamp) else {
            return;
        };

        for notice in fresh {
            debug!(vin = %vehicle.vin(), %kind, name = %notice.name, "vehicle notice");
            let alert = VehicleAlert {
                vin: vehicle.vin().to_owned(),
                kind,
                name: notice.name,
                timestamp: DateTime::from_timestamp_millis(notice.timestamp).unwrap_or_default(),
                body: notice.body,
            };
            // Ignore send errors -- nobody is listening right now
            let _ = self.alert_tx.send(Arc::new(alert));
        }

        match kind {
            NoticeKind::Alert => vehicle.advance_alert_watermark(newest),
            NoticeKind::Error => vehicle.advance_error_watermark(newest),
        }
    }

    /// Consume frames until cancelled or the stream closes.
    pub async fn run(
        self,
        mut rx: broadcast::Receiver<Arc<StreamMessage>>,
        cancel: CancellationToken,
    ) {
        info!(vehicles = self.vehicles.len(), "stream reconciler started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                message = rx.recv() => match message {
                    Ok(message) => self.on_message(&message),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "stream reconciler lagged, frames dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("stream reconciler exiting");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::api::fake::FakeVehicle;
    use crate::config::IntegrationConfig;

    const VIN: &str = "5YJ3E1EA7KF000001";

    fn setup() -> (
        Arc<Vehicle>,
        StreamReconciler,
        broadcast::Receiver<Arc<VehicleAlert>>,
    ) {
        setup_with(FakeVehicle::with_state("online"))
    }

    fn setup_with(
        api: FakeVehicle,
    ) -> (
        Arc<Vehicle>,
        StreamReconciler,
        broadcast::Receiver<Arc<VehicleAlert>>,
    ) {
        let config = IntegrationConfig::new("token".to_string().into());
        let vehicle = Arc::new(Vehicle::new(VIN, "Car", Arc::new(api), &config));
        let (tx, rx) = broadcast::channel(16);
        let reconciler = StreamReconciler::new([Arc::clone(&vehicle)], tx);
        (vehicle, reconciler, rx)
    }

    fn frame(payload: Value) -> StreamMessage {
        let mut value = payload;
        value["vin"] = json!(VIN);
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn data_maps_field_to_key_and_notifies_field_listener() {
        let (vehicle, reconciler, _alerts) = setup();
        let version = vehicle.data().subscribe();
        let battery = vehicle.data().subscribe_field("BatteryLevel");

        reconciler.on_message(&frame(json!({ "data": { "BatteryLevel": 82 } })));

        assert_eq!(vehicle.data().get("charge_state_battery_level"), Some(json!(82)));
        assert_eq!(battery.latest(), Some(json!(82)));
        assert!(!version.has_changed().unwrap());
    }

    #[test]
    fn unmapped_field_is_stored_under_raw_name() {
        let (vehicle, reconciler, _alerts) = setup();

        reconciler.on_message(&frame(json!({ "data": { "HvacPower": "On" } })));

        assert_eq!(vehicle.data().get("HvacPower"), Some(json!("On")));
    }

    #[test]
    fn state_frame_sets_state_and_notifies() {
        let (vehicle, reconciler, _alerts) = setup();
        let version = vehicle.data().subscribe();

        reconciler.on_message(&frame(json!({ "state": "asleep" })));

        assert_eq!(vehicle.data().get_str("state").as_deref(), Some("asleep"));
        assert!(version.has_changed().unwrap());
    }

    #[test]
    fn vehicle_data_frame_is_flattened() {
        let (vehicle, reconciler, _alerts) = setup();

        reconciler.on_message(&frame(json!({
            "vehicle_data": { "climate_state": { "inside_temp": 21.5 } }
        })));

        assert_eq!(vehicle.data().get("climate_state_inside_temp"), Some(json!(21.5)));
    }

    #[test]
    fn config_frame_is_cached() {
        let (vehicle, reconciler, _alerts) = setup();

        reconciler.on_message(&frame(json!({ "config": { "fields": { "Gear": {} } } })));

        assert_eq!(
            vehicle.stream_config().as_deref(),
            Some(&json!({ "fields": { "Gear": {} } }))
        );
    }

    #[test]
    fn alerts_are_emitted_once_newest_first() {
        let (vehicle, reconciler, mut alerts) = setup();
        let batch = json!({
            "alerts": [
                { "name": "Old", "startedAt": "2026-01-01T00:00:00Z" },
                { "name": "New", "startedAt": "2026-01-01T00:05:00Z" }
            ]
        });

        reconciler.on_message(&frame(batch.clone()));
        reconciler.on_message(&frame(batch));

        assert_eq!(alerts.try_recv().unwrap().name, "New");
        assert_eq!(alerts.try_recv().unwrap().name, "Old");
        assert!(alerts.try_recv().is_err());
        assert_eq!(
            vehicle.last_alert(),
            DateTime::parse_from_rfc3339("2026-01-01T00:05:00Z")
                .unwrap()
                .timestamp_millis()
        );
    }

    #[test]
    fn older_batch_does_not_move_watermark_back() {
        let (vehicle, reconciler, mut alerts) = setup();

        reconciler.on_message(&frame(json!({ "errors": [{ "name": "E2", "createdAt": 2000 }] })));
        reconciler.on_message(&frame(json!({ "errors": [{ "name": "E1", "createdAt": 1000 }] })));

        assert_eq!(alerts.try_recv().unwrap().kind, NoticeKind::Error);
        assert!(alerts.try_recv().is_err());
        assert_eq!(vehicle.last_error(), 2000);
        assert_eq!(vehicle.last_alert(), 0);
    }

    #[test]
    fn frames_for_other_vehicles_are_ignored() {
        let (vehicle, reconciler, _alerts) = setup();
        let other: StreamMessage =
            serde_json::from_value(json!({ "vin": "OTHER", "state": "online" })).unwrap();

        reconciler.on_message(&other);

        assert!(vehicle.data().is_empty());
    }

    #[tokio::test]
    async fn run_consumes_until_cancelled() {
        let (vehicle, reconciler, _alerts) = setup();
        let (tx, rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(reconciler.run(rx, cancel.clone()));

        let mut version = vehicle.data().subscribe();
        tx.send(Arc::new(frame(json!({ "state": "online" })))).unwrap();
        version.changed().await.unwrap();
        assert_eq!(vehicle.data().get_str("state").as_deref(), Some("online"));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stream_update_after_poll_keeps_other_polled_keys() {
        let api = FakeVehicle::with_state("online");
        api.push_data(Ok(json!({
            "response": {
                "state": "online",
                "charge_state": { "battery_level": 80, "charging_state": "Stopped" },
                "climate_state": { "inside_temp": 19.0 }
            }
        })));
        let (vehicle, reconciler, _alerts) = setup_with(api);
        assert!(vehicle.data().is_empty());

        vehicle.coordinator().refresh().await.unwrap();
        assert_eq!(vehicle.data().get("charge_state_battery_level"), Some(json!(80)));

        reconciler.on_message(&frame(json!({ "data": { "BatteryLevel": 82 } })));

        assert_eq!(
            Value::Object(vehicle.data().snapshot()),
            json!({
                "state": "online",
                "charge_state_battery_level": 82,
                "charge_state_charging_state": "Stopped",
                "climate_state_inside_temp": 19.0
            })
        );
    }
}
