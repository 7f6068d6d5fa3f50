//! Shared configuration for Teslemetry tools.
//!
//! TOML profiles, access-token resolution (env + keyring + plaintext),
//! and translation to `teslemetry_core::IntegrationConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use teslemetry_core::IntegrationConfig;

/// Environment variable consulted before any stored token.
pub const ACCESS_TOKEN_ENV: &str = "TESLEMETRY_ACCESS_TOKEN";

const KEYRING_SERVICE: &str = "teslemetry";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("failed to store access token: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named Teslemetry account.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Access token (plaintext, prefer keyring or env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Environment variable name holding the access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_env: Option<String>,

    /// Override the REST base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Override the telemetry stream URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,

    /// Attach the telemetry stream (default on).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,

    /// Request timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Poll cadences in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_live_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_info_interval: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "teslemetry", "teslemetry").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("teslemetry");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
///
/// `TESLEMETRY_*` variables override file values; nested keys use a double
/// underscore (`TESLEMETRY_DEFAULTS__OUTPUT=json`). The access token
/// variable is left to [`resolve_access_token`].
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(
            Env::prefixed("TESLEMETRY_")
                .ignore(&["access_token"])
                .split("__"),
        );

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/access-token"))
}

/// Resolve the access token from the credential chain.
pub fn resolve_access_token(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    // 1. Environment: the profile's own variable, then the global one
    let env_names = profile
        .access_token_env
        .as_deref()
        .into_iter()
        .chain(std::iter::once(ACCESS_TOKEN_ENV));
    for name in env_names {
        if let Ok(val) = std::env::var(name) {
            if !val.is_empty() {
                return Ok(SecretString::from(val));
            }
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.access_token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Save a token to the system keyring under `profile_name`.
pub fn store_access_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

fn check_url(field: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::Validation {
            field: field.into(),
            reason: format!("invalid URL '{value}': {e}"),
        })
}

fn interval(field: &str, secs: Option<u64>, fallback: Duration) -> Result<Duration, ConfigError> {
    match secs {
        None => Ok(fallback),
        Some(0) => Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be at least one second".into(),
        }),
        Some(s) => Ok(Duration::from_secs(s)),
    }
}

/// Build an `IntegrationConfig` from a profile and the global defaults.
pub fn profile_to_integration_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<IntegrationConfig, ConfigError> {
    let token = resolve_access_token(profile, profile_name)?;
    let mut config = IntegrationConfig::new(token);

    if let Some(ref base_url) = profile.base_url {
        check_url("base_url", base_url)?;
        config.base_url.clone_from(base_url);
    }
    if let Some(ref stream_url) = profile.stream_url {
        check_url("stream_url", stream_url)?;
        config.stream_url.clone_from(stream_url);
    }

    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.streaming_enabled = profile.streaming.unwrap_or(true);
    config.vehicle_interval = interval(
        "vehicle_interval",
        profile.vehicle_interval,
        config.vehicle_interval,
    )?;
    config.energy_live_interval = interval(
        "energy_live_interval",
        profile.energy_live_interval,
        config.energy_live_interval,
    )?;
    config.energy_info_interval = interval(
        "energy_info_interval",
        profile.energy_info_interval,
        config.energy_info_interval,
    )?;

    Ok(config)
}
