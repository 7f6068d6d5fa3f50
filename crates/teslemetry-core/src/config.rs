// ── Runtime integration configuration ──
//
// Describes *how* to talk to Teslemetry: credentials, endpoints, and
// polling cadence. Never touches disk; the CLI builds an
// `IntegrationConfig` from its profile and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use teslemetry_api::{DEFAULT_BASE_URL, DEFAULT_STREAM_URL};

/// Vehicle data poll cadence.
pub const VEHICLE_INTERVAL: Duration = Duration::from_secs(30);
/// Energy live-status poll cadence.
pub const ENERGY_LIVE_INTERVAL: Duration = Duration::from_secs(30);
/// Energy site-info poll cadence.
pub const ENERGY_INFO_INTERVAL: Duration = Duration::from_secs(300);

/// Wake-up retry schedule.
///
/// After the n-th failed attempt the controller sleeps `n * step`. Once the
/// cumulative sleep reaches `budget` the next failure is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakePolicy {
    pub step: Duration,
    pub budget: Duration,
}

impl Default for WakePolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(5),
            budget: Duration::from_secs(15),
        }
    }
}

/// Everything [`Teslemetry::setup`](crate::Teslemetry::setup) needs.
#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    pub access_token: SecretString,
    pub base_url: String,
    pub stream_url: String,
    pub timeout: Duration,
    pub vehicle_interval: Duration,
    pub energy_live_interval: Duration,
    pub energy_info_interval: Duration,
    /// Attach the telemetry stream after the first refresh.
    pub streaming_enabled: bool,
    pub wake: WakePolicy,
}

impl IntegrationConfig {
    /// Default endpoints and cadence around the given token.
    pub fn new(access_token: SecretString) -> Self {
        Self {
            access_token,
            base_url: DEFAULT_BASE_URL.to_owned(),
            stream_url: DEFAULT_STREAM_URL.to_owned(),
            timeout: Duration::from_secs(30),
            vehicle_interval: VEHICLE_INTERVAL,
            energy_live_interval: ENERGY_LIVE_INTERVAL,
            energy_info_interval: ENERGY_INFO_INTERVAL,
            streaming_enabled: true,
            wake: WakePolicy::default(),
        }
    }
}
