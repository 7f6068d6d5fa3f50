// ── Vehicle handle ──

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use arc_swap::ArcSwapOption;
use serde_json::Value;

use super::DeviceInfo;
use crate::api::VehicleApi;
use crate::command::{VehicleCommand, execute_vehicle_command};
use crate::config::IntegrationConfig;
use crate::coordinator::RefreshCoordinator;
use crate::error::CoreError;
use crate::store::DataMap;
use crate::wake::WakeController;

/// Reachability reported under the `state` key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum VehicleState {
    Online,
    Asleep,
    Offline,
}

/// One vehicle on the account.
pub struct Vehicle {
    vin: String,
    display_name: String,
    api: Arc<dyn VehicleApi>,
    coordinator: Arc<RefreshCoordinator>,
    wake: WakeController,

    /// Newest alert start time already emitted, epoch millis.
    last_alert: AtomicI64,
    /// Newest error creation time already emitted, epoch millis.
    last_error: AtomicI64,

    stream_config: ArcSwapOption<Value>,
    streaming: AtomicBool,
}

impl Vehicle {
    pub fn new(
        vin: impl Into<String>,
        display_name: impl Into<String>,
        api: Arc<dyn VehicleApi>,
        config: &IntegrationConfig,
    ) -> Self {
        let vin = vin.into();
        let coordinator = Arc::new(RefreshCoordinator::vehicle(
            &vin,
            Arc::clone(&api),
            config.vehicle_interval,
        ));
        let wake = WakeController::new(
            vin.clone(),
            Arc::clone(&api),
            Arc::clone(coordinator.data()),
            config.wake,
        );

        Self {
            vin,
            display_name: display_name.into(),
            api,
            coordinator,
            wake,
            last_alert: AtomicI64::new(0),
            last_error: AtomicI64::new(0),
            stream_config: ArcSwapOption::empty(),
            streaming: AtomicBool::new(false),
        }
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn vin(&self) -> &str {
        &self.vin
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Model name decoded from the fourth VIN character.
    pub fn model(&self) -> Option<&'static str> {
        model_from_vin(&self.vin)
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            identifier: self.vin.clone(),
            name: self.display_name.clone(),
            manufacturer: "Tesla",
            model: self.model().map(str::to_owned),
            serial_number: Some(self.vin.clone()),
        }
    }

    // ── Data ─────────────────────────────────────────────────────────

    pub fn api(&self) -> &Arc<dyn VehicleApi> {
        &self.api
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn data(&self) -> &Arc<DataMap> {
        self.coordinator.data()
    }

    pub fn state(&self) -> Option<VehicleState> {
        self.data().get_str("state")?.parse().ok()
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn wake_up_if_asleep(&self) -> Result<(), CoreError> {
        self.wake.ensure_awake().await
    }

    /// Wake the vehicle if needed, then send `command`.
    ///
    /// `Ok(false)` means the vehicle answered with a benign refusal such as
    /// `already_set`.
    pub async fn command(&self, command: &VehicleCommand) -> Result<bool, CoreError> {
        self.wake_up_if_asleep().await?;
        execute_vehicle_command(self.api.command(command.name(), &command.body())).await
    }

    // ── Stream bookkeeping ───────────────────────────────────────────

    pub fn last_alert(&self) -> i64 {
        self.last_alert.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> i64 {
        self.last_error.load(Ordering::Acquire)
    }

    /// Raise the alert watermark. Never moves backwards.
    pub(crate) fn advance_alert_watermark(&self, timestamp: i64) {
        self.last_alert.fetch_max(timestamp, Ordering::AcqRel);
    }

    /// Raise the error watermark. Never moves backwards.
    pub(crate) fn advance_error_watermark(&self, timestamp: i64) {
        self.last_error.fetch_max(timestamp, Ordering::AcqRel);
    }

    pub fn stream_config(&self) -> Option<Arc<Value>> {
        self.stream_config.load_full()
    }

    pub(crate) fn set_stream_config(&self, config: Value) {
        self.stream_config.store(Some(Arc::new(config)));
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub(crate) fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::Release);
    }
}

fn model_from_vin(vin: &str) -> Option<&'static str> {
    match vin.chars().nth(3)? {
        'S' => Some("Model S"),
        '3' => Some("Model 3"),
        'X' => Some("Model X"),
        'Y' => Some("Model Y"),
        'C' => Some("Cybertruck"),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::api::fake::FakeVehicle;

    fn vehicle(vin: &str, api: Arc<FakeVehicle>) -> Vehicle {
        let config = IntegrationConfig::new("token".to_string().into());
        Vehicle::new(vin, "Test Car", api, &config)
    }

    #[test]
    fn model_is_decoded_from_vin() {
        assert_eq!(model_from_vin("5YJ3E1EA7KF000001"), Some("Model 3"));
        assert_eq!(model_from_vin("7SAYGDEE1PA000001"), Some("Model Y"));
        assert_eq!(model_from_vin("5YJSA1E2XJF000001"), Some("Model S"));
        assert_eq!(model_from_vin("7G2CEHED0RA000001"), Some("Cybertruck"));
        assert_eq!(model_from_vin("ABC"), None);
    }

    #[test]
    fn state_parses_from_data() {
        let v = vehicle("5YJ3E1EA7KF000001", Arc::new(FakeVehicle::with_state("online")));
        assert_eq!(v.state(), None);
        v.data().insert("state", json!("asleep"));
        assert_eq!(v.state(), Some(VehicleState::Asleep));
    }

    #[test]
    fn watermarks_only_move_forward() {
        let v = vehicle("5YJ3E1EA7KF000001", Arc::new(FakeVehicle::with_state("online")));
        v.advance_alert_watermark(200);
        v.advance_alert_watermark(100);
        assert_eq!(v.last_alert(), 200);
        assert_eq!(v.last_error(), 0);
    }

    #[tokio::test]
    async fn command_wakes_then_sends() {
        let api = Arc::new(FakeVehicle::with_state("online"));
        let v = vehicle("5YJ3E1EA7KF000001", api.clone());
        v.data().insert("state", json!("asleep"));

        let applied = v
            .command(&VehicleCommand::SetChargeLimit { percent: 80 })
            .await
            .unwrap();

        assert!(applied);
        assert_eq!(
            api.sent_commands(),
            vec![("set_charge_limit".to_owned(), json!({ "percent": 80 }))]
        );
    }
}
