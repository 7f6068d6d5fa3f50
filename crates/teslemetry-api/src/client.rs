// Async HTTP client for the Teslemetry proxy of the Tesla Fleet API.
//
// Auth: `Authorization: Bearer <access_token>`
// Every successful call returns the raw `{"response": ...}` envelope so the
// caller decides how much of it to trust.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::Error;
use crate::transport::TransportConfig;

/// Default Teslemetry API root.
pub const DEFAULT_BASE_URL: &str = "https://api.teslemetry.com/";

/// Fallback when a 429 arrives without a usable `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

// ── Response shapes ──────────────────────────────────────────────────

/// Account metadata returned by `GET /api/metadata`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// OAuth scopes granted to the token, e.g. `vehicle_device_data`.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Metadata {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Fleet telemetry configuration for one vehicle.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub synced: bool,
    /// Field map the vehicle is configured to push.
    pub config: Value,
}

#[derive(Deserialize)]
struct StreamConfigEnvelope {
    response: StreamConfigBody,
}

#[derive(Deserialize)]
struct StreamConfigBody {
    #[serde(default)]
    synced: bool,
    #[serde(default)]
    config: Option<Value>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

// ── Vehicle data endpoints ───────────────────────────────────────────

/// Sub-documents requested from `vehicle_data`.
pub const VEHICLE_DATA_ENDPOINTS: &[&str] = &[
    "charge_state",
    "climate_state",
    "drive_state",
    "location_data",
    "vehicle_state",
    "vehicle_config",
];

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the Teslemetry API.
///
/// Cheap to clone: the inner `reqwest::Client` is reference counted, so
/// per-product handles ([`VehicleClient`], [`EnergySiteClient`]) share a
/// single connection pool.
#[derive(Clone)]
pub struct TeslemetryClient {
    http: reqwest::Client,
    base_url: Url,
}

impl TeslemetryClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from an access token and transport config.
    ///
    /// Injects `Authorization: Bearer` as a default header on every request.
    pub fn from_access_token(
        base_url: &str,
        access_token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        let mut value =
            HeaderValue::from_str(&format!("Bearer {}", access_token.expose_secret()))
                .map_err(|e| Error::InvalidHeader(e.to_string()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);

        let http = transport.build_client_with_headers(headers)?;
        let base_url = Self::normalize_base_url(base_url)?;

        Ok(Self { http, base_url })
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self { http, base_url })
    }

    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    /// Handle for one vehicle, addressed by VIN.
    pub fn vehicle(&self, vin: impl Into<String>) -> VehicleClient {
        VehicleClient {
            client: self.clone(),
            vin: vin.into(),
        }
    }

    /// Handle for one energy site, addressed by numeric site id.
    pub fn energy_site(&self, site_id: u64) -> EnergySiteClient {
        EnergySiteClient {
            client: self.clone(),
            site_id,
        }
    }

    // ── Account endpoints ────────────────────────────────────────────

    /// Token metadata, including granted scopes.
    pub async fn metadata(&self) -> Result<Metadata, Error> {
        let body = self.get("api/metadata", &[]).await?;
        decode(body)
    }

    /// All products (vehicles and energy sites) on the account.
    pub async fn products(&self) -> Result<Value, Error> {
        self.get("api/1/products", &[]).await
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, Error> {
        let url = self.url(path)?;
        debug!("GET {url} params={params:?}");

        let resp = self.http.get(url).query(params).send().await?;
        handle_response(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self.http.post(url).json(body).send().await?;
        handle_response(resp).await
    }
}

// ── Per-product handles ──────────────────────────────────────────────

/// Vehicle-scoped endpoints.
#[derive(Clone)]
pub struct VehicleClient {
    client: TeslemetryClient,
    vin: String,
}

impl VehicleClient {
    pub fn vin(&self) -> &str {
        &self.vin
    }

    /// Vehicle summary. Does not wake the vehicle; `response.state` reports
    /// `online`, `asleep` or `offline`.
    pub async fn vehicle(&self) -> Result<Value, Error> {
        self.client
            .get(&format!("api/1/vehicles/{}", self.vin), &[])
            .await
    }

    /// Full vehicle data for the requested sub-documents.
    pub async fn vehicle_data(&self, endpoints: &[&str]) -> Result<Value, Error> {
        self.client
            .get(
                &format!("api/1/vehicles/{}/vehicle_data", self.vin),
                &[("endpoints", endpoints.join(";"))],
            )
            .await
    }

    pub async fn wake_up(&self) -> Result<Value, Error> {
        self.client
            .post(
                &format!("api/1/vehicles/{}/wake_up", self.vin),
                &Value::Object(serde_json::Map::new()),
            )
            .await
    }

    /// Issue `POST /api/1/vehicles/{vin}/command/{name}`.
    pub async fn command(&self, name: &str, body: &Value) -> Result<Value, Error> {
        self.client
            .post(&format!("api/1/vehicles/{}/command/{name}", self.vin), body)
            .await
    }

    /// Fleet telemetry configuration. A vehicle without one cannot stream.
    pub async fn fleet_telemetry_config(&self) -> Result<StreamConfig, Error> {
        let body = self
            .client
            .get(
                &format!("api/1/vehicles/{}/fleet_telemetry_config", self.vin),
                &[],
            )
            .await?;
        let envelope: StreamConfigEnvelope = decode(body)?;
        match envelope.response.config {
            Some(config) if !config.is_null() => Ok(StreamConfig {
                synced: envelope.response.synced,
                config,
            }),
            _ => Err(Error::VehicleNotConfigured {
                vin: self.vin.clone(),
            }),
        }
    }
}

/// Energy-site-scoped endpoints.
#[derive(Clone)]
pub struct EnergySiteClient {
    client: TeslemetryClient,
    site_id: u64,
}

impl EnergySiteClient {
    pub fn site_id(&self) -> u64 {
        self.site_id
    }

    /// Instantaneous power flows, battery level, grid status, wall connectors.
    pub async fn live_status(&self) -> Result<Value, Error> {
        self.client
            .get(&format!("api/1/energy_sites/{}/live_status", self.site_id), &[])
            .await
    }

    /// Slow-moving site configuration.
    pub async fn site_info(&self) -> Result<Value, Error> {
        self.client
            .get(&format!("api/1/energy_sites/{}/site_info", self.site_id), &[])
            .await
    }

    /// Issue `POST /api/1/energy_sites/{id}/{name}`.
    pub async fn command(&self, name: &str, body: &Value) -> Result<Value, Error> {
        self.client
            .post(&format!("api/1/energy_sites/{}/{name}", self.site_id), body)
            .await
    }
}

// ── Response handling ────────────────────────────────────────────────

/// Map HTTP status codes onto the vendor error taxonomy.
async fn handle_response(resp: reqwest::Response) -> Result<Value, Error> {
    let status = resp.status();

    if status.is_success() {
        let body = resp.text().await?;
        return serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        });
    }

    match status.as_u16() {
        401 => return Err(Error::InvalidToken),
        402 => return Err(Error::SubscriptionRequired),
        408 => return Err(Error::VehicleOffline),
        429 => {
            let retry_after_secs = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(Error::RateLimited { retry_after_secs });
        }
        _ => {}
    }

    let raw = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&raw)
        .ok()
        .and_then(|e| e.error_description.or(e.error))
        .unwrap_or_else(|| {
            if raw.is_empty() {
                status.canonical_reason().unwrap_or("unknown").to_owned()
            } else {
                raw.clone()
            }
        });

    Err(Error::Fleet {
        status: status.as_u16(),
        message,
    })
}

fn decode<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, Error> {
    serde_json::from_value(body.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: body.to_string(),
    })
}
