use thiserror::Error;

/// Top-level error type for the `teslemetry-api` crate.
///
/// Mirrors the Fleet API failure taxonomy: credential problems, the
/// "vehicle is asleep/unreachable" condition, generic vendor errors, and
/// transport failures. `teslemetry-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Access token rejected (HTTP 401).
    #[error("Invalid access token")]
    InvalidToken,

    /// Token is valid but the Teslemetry subscription lapsed (HTTP 402).
    #[error("Teslemetry subscription required")]
    SubscriptionRequired,

    // ── Vehicle state ───────────────────────────────────────────────
    /// The vehicle is offline or asleep and could not be reached (HTTP 408).
    #[error("Vehicle is offline")]
    VehicleOffline,

    /// The vehicle has no fleet telemetry configuration, so it cannot stream.
    #[error("Vehicle {vin} is not configured for streaming")]
    VehicleNotConfigured { vin: String },

    // ── Vendor ──────────────────────────────────────────────────────
    /// Structured error from the Fleet API.
    #[error("Fleet API error (HTTP {status}): {message}")]
    Fleet { status: u16, message: String },

    /// Rate limited. Includes retry-after in seconds.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Access token contains characters that cannot go in a header.
    #[error("Invalid access token header: {0}")]
    InvalidHeader(String),

    // ── Streaming ───────────────────────────────────────────────────
    /// Stream connection failed.
    #[error("Stream connection failed: {0}")]
    StreamConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the error means the credentials must be replaced.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::InvalidToken | Self::SubscriptionRequired)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited { .. } | Self::StreamConnect(_) | Self::VehicleOffline => true,
            _ => false,
        }
    }

    /// The vendor-supplied message, or the display text for local failures.
    pub fn message(&self) -> String {
        match self {
            Self::Fleet { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
