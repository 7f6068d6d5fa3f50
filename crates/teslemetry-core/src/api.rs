// ── Vendor API seams ──
//
// Coordinators, the wake controller and the command executor talk to
// these traits instead of the concrete HTTP clients, so the same code
// runs against `teslemetry-api` in production and in-memory fakes in
// tests.

use async_trait::async_trait;
use serde_json::Value;
use teslemetry_api::{EnergySiteClient, StreamConfig, VEHICLE_DATA_ENDPOINTS, VehicleClient};

pub type ApiResult<T = Value> = Result<T, teslemetry_api::Error>;

/// Vehicle-scoped vendor calls.
#[async_trait]
pub trait VehicleApi: Send + Sync {
    /// Summary document; reports `response.state` without waking the car.
    async fn vehicle(&self) -> ApiResult;

    /// Full vehicle data for every sub-document the integration reads.
    async fn vehicle_data(&self) -> ApiResult;

    async fn wake_up(&self) -> ApiResult;

    async fn command(&self, name: &str, body: &Value) -> ApiResult;

    async fn stream_config(&self) -> ApiResult<StreamConfig>;
}

/// Energy-site-scoped vendor calls.
#[async_trait]
pub trait EnergySiteApi: Send + Sync {
    async fn live_status(&self) -> ApiResult;

    async fn site_info(&self) -> ApiResult;

    async fn command(&self, name: &str, body: &Value) -> ApiResult;
}

#[async_trait]
impl VehicleApi for VehicleClient {
    async fn vehicle(&self) -> ApiResult {
        VehicleClient::vehicle(self).await
    }

    async fn vehicle_data(&self) -> ApiResult {
        VehicleClient::vehicle_data(self, VEHICLE_DATA_ENDPOINTS).await
    }

    async fn wake_up(&self) -> ApiResult {
        VehicleClient::wake_up(self).await
    }

    async fn command(&self, name: &str, body: &Value) -> ApiResult {
        VehicleClient::command(self, name, body).await
    }

    async fn stream_config(&self) -> ApiResult<StreamConfig> {
        self.fleet_telemetry_config().await
    }
}

#[async_trait]
impl EnergySiteApi for EnergySiteClient {
    async fn live_status(&self) -> ApiResult {
        EnergySiteClient::live_status(self).await
    }

    async fn site_info(&self) -> ApiResult {
        EnergySiteClient::site_info(self).await
    }

    async fn command(&self, name: &str, body: &Value) -> ApiResult {
        EnergySiteClient::command(self, name, body).await
    }
}

// ── In-memory fakes ─────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod fake {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    /// Scripted vehicle: each call pops the next queued result for its
    /// method, falling back to the default when the queue is empty.
    pub(crate) struct FakeVehicle {
        pub vehicle: Mutex<VecDeque<ApiResult>>,
        pub vehicle_default: Value,
        pub data: Mutex<VecDeque<ApiResult>>,
        pub wake: Mutex<VecDeque<ApiResult>>,
        pub wake_default: Value,
        pub command_reply: Mutex<Option<ApiResult>>,
        pub commands: Mutex<Vec<(String, Value)>>,
        pub stream_configured: bool,
        pub wake_calls: AtomicU32,
        pub vehicle_calls: AtomicU32,
        pub data_calls: AtomicU32,
        /// Simulated latency of `vehicle_data`.
        pub data_delay: Duration,
    }

    impl FakeVehicle {
        pub(crate) fn with_state(state: &str) -> Self {
            Self {
                vehicle: Mutex::new(VecDeque::new()),
                vehicle_default: json!({ "response": { "state": state } }),
                data: Mutex::new(VecDeque::new()),
                wake: Mutex::new(VecDeque::new()),
                wake_default: json!({ "response": { "state": state } }),
                command_reply: Mutex::new(None),
                commands: Mutex::new(Vec::new()),
                stream_configured: true,
                wake_calls: AtomicU32::new(0),
                vehicle_calls: AtomicU32::new(0),
                data_calls: AtomicU32::new(0),
                data_delay: Duration::ZERO,
            }
        }

        pub(crate) fn push_data(&self, result: ApiResult) {
            self.data.lock().unwrap().push_back(result);
        }

        pub(crate) fn reply_to_commands(&self, result: ApiResult) {
            *self.command_reply.lock().unwrap() = Some(result);
        }

        pub(crate) fn sent_commands(&self) -> Vec<(String, Value)> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VehicleApi for FakeVehicle {
        async fn vehicle(&self) -> ApiResult {
            self.vehicle_calls.fetch_add(1, Ordering::SeqCst);
            self.vehicle
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.vehicle_default.clone()))
        }

        async fn vehicle_data(&self) -> ApiResult {
            self.data_calls.fetch_add(1, Ordering::SeqCst);
            if !self.data_delay.is_zero() {
                tokio::time::sleep(self.data_delay).await;
            }
            self.data
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({ "response": { "state": "online" } })))
        }

        async fn wake_up(&self) -> ApiResult {
            self.wake_calls.fetch_add(1, Ordering::SeqCst);
            self.wake
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.wake_default.clone()))
        }

        async fn command(&self, name: &str, body: &Value) -> ApiResult {
            self.commands
                .lock()
                .unwrap()
                .push((name.to_owned(), body.clone()));
            self.command_reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(json!({ "response": { "result": true, "reason": "" } })))
        }

        async fn stream_config(&self) -> ApiResult<StreamConfig> {
            if self.stream_configured {
                Ok(StreamConfig {
                    synced: true,
                    config: json!({ "fields": {} }),
                })
            } else {
                Err(teslemetry_api::Error::VehicleNotConfigured {
                    vin: "fake".into(),
                })
            }
        }
    }

    /// Scripted energy site.
    pub(crate) struct FakeSite {
        pub live: Mutex<VecDeque<ApiResult>>,
        pub info: Mutex<VecDeque<ApiResult>>,
        pub commands: Mutex<Vec<(String, Value)>>,
    }

    impl FakeSite {
        pub(crate) fn new() -> Self {
            Self {
                live: Mutex::new(VecDeque::new()),
                info: Mutex::new(VecDeque::new()),
                commands: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn push_live(&self, result: ApiResult) {
            self.live.lock().unwrap().push_back(result);
        }

        pub(crate) fn push_info(&self, result: ApiResult) {
            self.info.lock().unwrap().push_back(result);
        }

        pub(crate) fn sent_commands(&self) -> Vec<(String, Value)> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EnergySiteApi for FakeSite {
        async fn live_status(&self) -> ApiResult {
            self.live
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({ "response": {} })))
        }

        async fn site_info(&self) -> ApiResult {
            self.info
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({ "response": {} })))
        }

        async fn command(&self, name: &str, body: &Value) -> ApiResult {
            self.commands
                .lock()
                .unwrap()
                .push((name.to_owned(), body.clone()));
            Ok(json!({ "response": { "code": 201, "message": "Updated" } }))
        }
    }
}
