// ── Telemetry stream handling ──
//
// Turns raw stream frames into typed events and folds them into the
// vehicles' data maps.

mod event;
mod reconciler;

pub use event::{Notice, NoticeKind, TelemetryEvent, fresh_notices, parse_timestamp};
pub use reconciler::{StreamReconciler, VehicleAlert};
