//! Merger (C2). Deep-merges two JSON objects: base `A`, override `B`. For
//! each key in `B`, if both sides are objects they recurse; otherwise `B`
//! wins. Arrays and scalars are replaced, never concatenated (spec.md §4.2).

use serde_json::{Map, Value};

pub fn deep_merge(base: &Value, over: &Value) -> Value {
    match (base, over) {
        (Value::Object(base_map), Value::Object(over_map)) => {
            Value::Object(deep_merge_maps(base_map, over_map))
        }
        (_, Value::Null) => base.clone(),
        (_, other) => other.clone(),
    }
}

pub fn deep_merge_maps(base: &Map<String, Value>, over: &Map<String, Value>) -> Map<String, Value> {
    let mut result = base.clone();
    for (key, over_value) in over {
        match result.get(key) {
            Some(Value::Object(base_child)) if over_value.is_object() => {
                let over_child = over_value.as_object().unwrap();
                result.insert(key.clone(), Value::Object(deep_merge_maps(base_child, over_child)));
            }
            _ => {
                result.insert(key.clone(), over_value.clone());
            }
        }
    }
    result
}

/// Merge a `Some`/`None` pair of objects where a missing side behaves as an
/// empty object, as used for layering template/dataset/runtime variables
/// and header/param/cookie/body-data overrides.
pub fn merge_optional(base: Option<&Value>, over: Option<&Value>) -> Value {
    let empty = Value::Object(Map::new());
    deep_merge(base.unwrap_or(&empty), over.unwrap_or(&empty))
}
