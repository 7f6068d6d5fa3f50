// ── Vehicle wake-up ──
//
// Commands need an online vehicle. `WakeController` serializes wake
// attempts per vehicle: concurrent callers queue on the same lock and
// the ones behind the first see the vehicle already online.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::VehicleApi;
use crate::config::WakePolicy;
use crate::error::CoreError;
use crate::model::VehicleState;
use crate::store::DataMap;

/// Per-vehicle wake-up gate.
pub struct WakeController {
    vin: String,
    api: Arc<dyn VehicleApi>,
    data: Arc<DataMap>,
    policy: WakePolicy,
    lock: Mutex<()>,
}

impl WakeController {
    pub fn new(
        vin: impl Into<String>,
        api: Arc<dyn VehicleApi>,
        data: Arc<DataMap>,
        policy: WakePolicy,
    ) -> Self {
        Self {
            vin: vin.into(),
            api,
            data,
            policy,
            lock: Mutex::new(()),
        }
    }

    /// Return once the vehicle reports `online`.
    ///
    /// The first attempt sends `wake_up`; later attempts only poll the
    /// vehicle summary. After the n-th miss the controller sleeps
    /// `n * step`; once the total sleep reaches the policy budget the next
    /// miss fails with [`CoreError::WakeTimeout`]. Vendor errors end the
    /// loop immediately.
    pub async fn ensure_awake(&self) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;

        let mut attempts: u32 = 0;
        let mut waited = Duration::ZERO;

        loop {
            if self.is_online() {
                return Ok(());
            }

            let reply = if attempts == 0 {
                self.api.wake_up().await
            } else {
                self.api.vehicle().await
            };
            let reply = reply.map_err(|e| {
                warn!(vin = %self.vin, attempt = attempts + 1, error = %e, "wake request failed");
                CoreError::from(e)
            })?;
            attempts += 1;

            if let Some(state) = reply.pointer("/response/state").and_then(Value::as_str) {
                self.data.set("state", Value::String(state.to_owned()));
            }

            if self.is_online() {
                info!(vin = %self.vin, attempts, "vehicle is awake");
                return Ok(());
            }

            if waited >= self.policy.budget {
                warn!(
                    vin = %self.vin,
                    attempts,
                    waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                    "vehicle did not wake up"
                );
                return Err(CoreError::WakeTimeout {
                    vin: self.vin.clone(),
                    attempts,
                });
            }

            let delay = self.policy.step * attempts;
            debug!(vin = %self.vin, attempts, delay_secs = delay.as_secs(), "waiting for vehicle to wake");
            tokio::time::sleep(delay).await;
            waited += delay;
        }
    }

    fn is_online(&self) -> bool {
        self.data
            .get_str("state")
            .is_some_and(|s| s == VehicleState::Online.as_ref())
    }
}
