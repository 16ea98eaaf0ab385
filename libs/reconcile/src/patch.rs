//! Two-way JSON merge patches (RFC 7386).
//!
//! Objects are diffed key by key; removed keys become `null`. Arrays and
//! scalars are replaced whole when they differ.

use serde_json::{Map, Value};

/// Compute the patch that turns `original` into `modified`.
///
/// Returns an empty object when the two are equal.
pub fn create_merge_patch(original: &Value, modified: &Value) -> Value {
    diff(original, modified).unwrap_or_else(|| Value::Object(Map::new()))
}

/// True if applying `patch` would change nothing.
pub fn is_empty_patch(patch: &Value) -> bool {
    matches!(patch, Value::Object(map) if map.is_empty())
}

/// Apply a merge patch in place.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                apply_merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn diff(original: &Value, modified: &Value) -> Option<Value> {
    match (original, modified) {
        (Value::Object(old), Value::Object(new)) => {
            let mut patch = Map::new();
            for (key, old_value) in old {
                match new.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new_value) => {
                        if let Some(d) = diff(old_value, new_value) {
                            patch.insert(key.clone(), d);
                        }
                    }
                }
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    patch.insert(key.clone(), new_value.clone());
                }
            }
            (!patch.is_empty()).then_some(Value::Object(patch))
        }
        (old, new) if old == new => None,
        (_, new) => Some(new.clone()),
    }
}
