// ── Nested document flattening ──
//
// Vehicle and energy payloads arrive as nested JSON. Entities address
// values by a single flat key, `charge_state_battery_level` rather than
// `charge_state.battery_level`, so every payload passes through here
// before it reaches a `DataMap`.

use serde_json::{Map, Value};
use tracing::warn;

/// Flatten nested objects into `parent_child` keys.
///
/// Arrays and scalars are leaves. An object whose own key is listed in
/// `stop_keys` is kept intact as a nested value, at any depth. A non-object
/// root yields an empty map.
///
/// Two paths that collapse onto the same flat key are a data problem: the
/// later one wins and a warning is logged.
pub fn flatten(data: &Value, stop_keys: &[&str]) -> Map<String, Value> {
    let mut out = Map::new();
    if let Value::Object(root) = data {
        flatten_into(&mut out, None, root, stop_keys);
    }
    out
}

fn flatten_into(
    out: &mut Map<String, Value>,
    parent: Option<&str>,
    data: &Map<String, Value>,
    stop_keys: &[&str],
) {
    for (key, value) in data {
        let path = match parent {
            Some(parent) => format!("{parent}_{key}"),
            None => key.clone(),
        };

        match value {
            Value::Object(child) if !stop_keys.contains(&key.as_str()) => {
                flatten_into(out, Some(&path), child, stop_keys);
            }
            leaf => {
                if out.contains_key(&path) {
                    warn!(key = %path, "flattened key collision, keeping last value");
                }
                debug_assert!(!out.contains_key(&path), "flattened key collision: {path}");
                out.insert(path, leaf.clone());
            }
        }
    }
}
