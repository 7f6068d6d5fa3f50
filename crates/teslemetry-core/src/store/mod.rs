// ── Shared per-device data map ──
//
// One `DataMap` per coordinator. The coordinator's refresh and the
// stream reconciler both write into it; entities only read it or call
// `set()`. Change notification happens on two levels: a version counter
// for "something changed, re-read" and per-field channels for streamed
// values that bypass the bulk notify.

mod field;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::watch;

pub use field::FieldStream;

/// Flat key -> JSON value store with push-based change notification.
///
/// Uses `DashMap` for concurrent lookups and `watch` channels for
/// notification, like every other reactive store in the workspace.
pub struct DataMap {
    entries: DashMap<String, Value>,

    /// Bumped by [`notify`](Self::notify) and [`set`](Self::set).
    version: watch::Sender<u64>,

    /// Per-field listeners keyed by streaming field name. Created lazily
    /// on first subscription.
    fields: DashMap<String, watch::Sender<Option<Value>>>,
}

impl Default for DataMap {
    fn default() -> Self {
        Self::new()
    }
}

impl DataMap {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            entries: DashMap::new(),
            version,
            fields: DashMap::new(),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .and_then(|r| r.value().as_str().map(str::to_owned))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time copy of every key.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Write one key without notifying.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Merge many keys without notifying. Keys absent from `values` are
    /// left untouched.
    pub fn merge(&self, values: Map<String, Value>) {
        for (key, value) in values {
            self.entries.insert(key, value);
        }
    }

    /// Write one key, then tell every listener to re-read.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
        self.notify();
    }

    /// Bump the version counter.
    pub fn notify(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.version.send_modify(|v| *v += 1);
    }

    /// Hand a streamed value to whoever listens on `field`. Does not touch
    /// the version counter.
    pub fn publish_field(&self, field: &str, value: &Value) {
        if let Some(tx) = self.fields.get(field) {
            tx.send_replace(Some(value.clone()));
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn subscribe_field(&self, field: &str) -> FieldStream {
        let rx = self
            .fields
            .entry(field.to_owned())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe();
        FieldStream::new(rx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn merge_keeps_unrelated_keys() {
        let data = DataMap::new();
        data.merge(json!({ "a": 1, "b": 2 }).as_object().unwrap().clone());
        data.merge(json!({ "a": 3 }).as_object().unwrap().clone());

        assert_eq!(Value::Object(data.snapshot()), json!({ "a": 3, "b": 2 }));
    }

    #[test]
    fn set_bumps_version_but_insert_does_not() {
        let data = DataMap::new();
        let rx = data.subscribe();

        data.insert("state", json!("asleep"));
        assert!(!rx.has_changed().unwrap());

        data.set("state", json!("online"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(data.get_str("state").as_deref(), Some("online"));
    }

    #[test]
    fn publish_field_reaches_only_that_field() {
        let data = DataMap::new();
        let version = data.subscribe();
        let battery = data.subscribe_field("BatteryLevel");
        let speed = data.subscribe_field("VehicleSpeed");

        data.publish_field("BatteryLevel", &json!(82));

        assert_eq!(battery.latest(), Some(json!(82)));
        assert_eq!(speed.latest(), None);
        assert!(!version.has_changed().unwrap());
    }

    #[test]
    fn publish_without_listener_is_noop() {
        let data = DataMap::new();
        data.publish_field("Odometer", &json!(1.0));
        assert!(data.is_empty());
    }
}
