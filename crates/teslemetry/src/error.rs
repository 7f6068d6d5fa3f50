//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use teslemetry_config::ConfigError;
use teslemetry_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 5;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(teslemetry::auth_failed),
        help(
            "Check the access token on your Teslemetry console.\n\
             Run: teslemetry config set-token --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No access token configured for profile '{profile}'")]
    #[diagnostic(
        code(teslemetry::no_credentials),
        help(
            "Store one with: teslemetry config set-token\n\
             Or set the TESLEMETRY_ACCESS_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    #[error("A Teslemetry subscription is required")]
    #[diagnostic(
        code(teslemetry::subscription),
        help("Renew your subscription on the Teslemetry console.")
    )]
    SubscriptionRequired,

    // ── Devices ──────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(teslemetry::not_found),
        help("Run: teslemetry status to see available devices")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error("Vehicle {vin} did not wake up after {attempts} attempts")]
    #[diagnostic(
        code(teslemetry::wake_timeout),
        help("The vehicle may be out of coverage. Try again later.")
    )]
    WakeTimeout { vin: String, attempts: u32 },

    // ── Commands ─────────────────────────────────────────────────────

    #[error("The vehicle refused the command: {reason}")]
    #[diagnostic(code(teslemetry::rejected))]
    Rejected { reason: String },

    #[error("API error: {message}")]
    #[diagnostic(code(teslemetry::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(teslemetry::validation))]
    Validation { field: String, reason: String },

    #[error("Operation '{operation}' is not supported")]
    #[diagnostic(code(teslemetry::unsupported))]
    Unsupported { operation: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(teslemetry::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: teslemetry config set-token --profile {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(teslemetry::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(teslemetry::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthFailed { .. } | Self::NoCredentials { .. } | Self::SubscriptionRequired => {
                exit_code::AUTH
            }
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::WakeTimeout { .. } => exit_code::TIMEOUT,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Validation { .. } | Self::Unsupported { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::UnknownProfile { profile } => Self::ProfileNotFound {
                name: profile,
                available: "(see teslemetry config profiles)".into(),
            },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Authentication { message } => Self::AuthFailed {
                profile: "current".into(),
                message,
            },

            CoreError::SubscriptionRequired => Self::SubscriptionRequired,

            CoreError::WakeTimeout { vin, attempts } => Self::WakeTimeout { vin, attempts },

            CoreError::VehicleNotFound { vin } => Self::NotFound {
                resource_type: "vehicle".into(),
                identifier: vin,
            },

            CoreError::EnergySiteNotFound { site_id } => Self::NotFound {
                resource_type: "energy site".into(),
                identifier: site_id,
            },

            CoreError::DeviceNotFound { identifier } => Self::NotFound {
                resource_type: "device".into(),
                identifier,
            },

            CoreError::CommandRejected { reason } => Self::Rejected { reason },
            CoreError::CommandNoReason => Self::Rejected {
                reason: "(no reason given)".into(),
            },

            CoreError::ValidationFailed { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Unsupported { operation } => Self::Unsupported { operation },

            other => Self::ApiError {
                message: other.to_string(),
            },
        }
    }
}
