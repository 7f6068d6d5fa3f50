// ── Core error types ──
//
// User-facing errors from teslemetry-core. Consumers never see HTTP
// status codes directly; the `From<teslemetry_api::Error>` impl folds
// transport-layer failures into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Credential errors ────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Teslemetry subscription required")]
    SubscriptionRequired,

    // ── Refresh errors ───────────────────────────────────────────────
    #[error("Update failed: {message}")]
    UpdateFailed { message: String },

    // ── Wake errors ──────────────────────────────────────────────────
    #[error("Vehicle {vin} did not wake up after {attempts} attempts")]
    WakeTimeout { vin: String, attempts: u32 },

    // ── Command errors ───────────────────────────────────────────────
    /// The vendor call itself failed.
    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    /// The envelope carried an `error` field instead of a `response`.
    #[error("Command returned an error: {error}")]
    CommandError { error: String },

    #[error("Command returned no response")]
    CommandNoResponse,

    #[error("Command was rejected: {reason}")]
    CommandRejected { reason: String },

    #[error("Command was rejected without a reason")]
    CommandNoReason,

    // ── Lookup errors ────────────────────────────────────────────────
    #[error("Vehicle not found: {vin}")]
    VehicleNotFound { vin: String },

    #[error("Energy site not found: {site_id}")]
    EnergySiteNotFound { site_id: String },

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Credentials must be replaced before anything else can succeed.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::SubscriptionRequired
        )
    }

    /// One of the command-envelope outcomes rather than a transport failure.
    pub fn is_command_rejection(&self) -> bool {
        matches!(
            self,
            Self::CommandError { .. }
                | Self::CommandNoResponse
                | Self::CommandRejected { .. }
                | Self::CommandNoReason
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<teslemetry_api::Error> for CoreError {
    fn from(err: teslemetry_api::Error) -> Self {
        use teslemetry_api::Error as ApiError;

        match err {
            ApiError::InvalidToken => CoreError::Authentication {
                message: "Invalid access token".into(),
            },
            ApiError::SubscriptionRequired => CoreError::SubscriptionRequired,
            ApiError::VehicleOffline => CoreError::Api {
                message: "Vehicle is offline".into(),
                status: Some(408),
            },
            ApiError::VehicleNotConfigured { vin } => CoreError::Unsupported {
                operation: format!("streaming for vehicle {vin}"),
            },
            ApiError::Fleet { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            ApiError::RateLimited { retry_after_secs } => CoreError::Api {
                message: format!("Rate limited -- retry after {retry_after_secs}s"),
                status: Some(429),
            },
            ApiError::Transport(e) => CoreError::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::InvalidHeader(message) => CoreError::Config { message },
            ApiError::StreamConnect(reason) => CoreError::Api {
                message: format!("Stream connection failed: {reason}"),
                status: None,
            },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
