//! Telemetry stream with auto-reconnect.
//!
//! Connects to the Teslemetry streaming endpoint and pushes parsed
//! [`StreamMessage`]s through a [`tokio::sync::broadcast`] channel.
//! Reconnection uses exponential backoff + jitter.
//!
//! # Example
//!
//! ```rust,ignore
//! use teslemetry_api::stream::{ReconnectConfig, StreamHandle};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let url = Url::parse("wss://api.teslemetry.com/streaming")?;
//!
//! let handle = StreamHandle::connect(url, &token, ReconnectConfig::default(), cancel.clone())?;
//! let mut rx = handle.subscribe();
//!
//! while let Ok(msg) = rx.recv().await {
//!     println!("{}: {:?}", msg.vin, msg.payload.keys().collect::<Vec<_>>());
//! }
//!
//! handle.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

/// Default Teslemetry streaming endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://api.teslemetry.com/streaming";

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── StreamMessage ────────────────────────────────────────────────────

/// One frame pushed by the streaming server.
///
/// Every frame names its vehicle. The remaining keys vary by frame kind
/// (`data`, `alerts`, `errors`, `state`, `vehicle_data`, `config`, ...),
/// so they are kept verbatim in `payload` for the core to interpret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessage {
    pub vin: String,

    /// Server-side creation time, ISO-8601.
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,

    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for stream reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: None,
        }
    }
}

// ── StreamHandle ─────────────────────────────────────────────────────

/// Handle to a running telemetry stream.
///
/// Call [`shutdown`](Self::shutdown) to tear down the background task.
pub struct StreamHandle {
    event_rx: broadcast::Receiver<Arc<StreamMessage>>,
    cancel: CancellationToken,
}

impl StreamHandle {
    /// Spawn the reconnection loop against `url`.
    ///
    /// Returns immediately once the background task is spawned; the first
    /// connection attempt happens asynchronously.
    pub fn connect(
        url: Url,
        access_token: &SecretString,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::StreamConnect(e.to_string()))?;
        let bearer = format!("Bearer {}", access_token.expose_secret());

        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            stream_loop(uri, bearer, event_tx, reconnect, task_cancel).await;
        });

        Ok(Self { event_rx, cancel })
    }

    /// Build a handle around an existing sender. The caller feeds messages
    /// directly; nothing is spawned.
    pub fn from_sender(
        event_tx: &broadcast::Sender<Arc<StreamMessage>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            event_rx: event_tx.subscribe(),
            cancel,
        }
    }

    /// Get a new broadcast receiver for the message stream.
    ///
    /// A consumer that falls behind receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StreamMessage>> {
        self.event_rx.resubscribe()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

async fn stream_loop(
    uri: tungstenite::http::Uri,
    bearer: String,
    event_tx: broadcast::Sender<Arc<StreamMessage>>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&uri, &bearer, &event_tx, &cancel) => {
                match result {
                    Ok(()) => {
                        tracing::info!("stream disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "stream error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "stream reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tracing::info!(
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }

                        attempt = attempt.saturating_add(1);
                    }
                }
            }
        }
    }

    tracing::debug!("stream loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

async fn connect_and_read(
    uri: &tungstenite::http::Uri,
    bearer: &str,
    event_tx: &broadcast::Sender<Arc<StreamMessage>>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(uri = %uri, "connecting to telemetry stream");

    let request = ClientRequestBuilder::new(uri.clone()).with_header("Authorization", bearer);

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::StreamConnect(e.to_string()))?;

    tracing::info!("telemetry stream connected");

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_broadcast(&text, event_tx);
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "close frame received");
                        } else {
                            tracing::info!("close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(Error::StreamConnect(e.to_string())),
                    None => {
                        tracing::info!("stream ended");
                        return Ok(());
                    }
                    // Ping is answered by tungstenite; binary frames are not used.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Parse a text frame and broadcast the message(s) inside.
///
/// The server sends either a single object or a batch array.
fn parse_and_broadcast(text: &str, event_tx: &broadcast::Sender<Arc<StreamMessage>>) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse stream frame");
            return;
        }
    };

    let items = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    for item in items {
        match serde_json::from_value::<StreamMessage>(item) {
            // Ignore send errors -- no active subscribers right now
            Ok(msg) => {
                let _ = event_tx.send(Arc::new(msg));
            }
            Err(e) => tracing::debug!(error = %e, "stream message without vin, skipping"),
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`, jitter within +-25%.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
