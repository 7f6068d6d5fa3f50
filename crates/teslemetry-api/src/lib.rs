// teslemetry-api: Async Rust client for the Teslemetry proxy of the Tesla Fleet API

pub mod client;
pub mod error;
pub mod stream;
pub mod transport;

pub use client::{
    DEFAULT_BASE_URL, EnergySiteClient, Metadata, StreamConfig, TeslemetryClient,
    VEHICLE_DATA_ENDPOINTS, VehicleClient,
};
pub use error::Error;
pub use stream::{DEFAULT_STREAM_URL, ReconnectConfig, StreamHandle, StreamMessage};
pub use transport::TransportConfig;
