//! Dotted-path helpers over JSON objects.
//!
//! These mirror the host's update semantics: an update object may use dotted
//! keys (`"flags.easy-phasey.mergeTokens"`), which are expanded into nested
//! objects before being merged. Objects merge recursively, every other value
//! replaces what was there, and a `-=key` entry deletes `key`.

use serde_json::{Map, Value};

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '.';

/// Prefix marking a deletion inside an update object.
pub const DELETE_PREFIX: &str = "-=";

/// Expand dotted keys into nested objects, recursively.
pub fn expand_object(source: Map<String, Value>) -> Map<String, Value> {
    let mut expanded = Map::new();
    for (key, value) in source {
        let value = match value {
            Value::Object(inner) => Value::Object(expand_object(inner)),
            other => other,
        };
        if key.contains(PATH_SEPARATOR) {
            set_path(&mut expanded, &key, value);
        } else {
            insert_value(&mut expanded, key, value);
        }
    }
    expanded
}

/// Merge `changes` into `target`. Returns whether `target` changed.
pub fn merge_object(target: &mut Map<String, Value>, changes: Map<String, Value>) -> bool {
    let before = target.clone();
    merge_entries(target, expand_object(changes));
    *target != before
}

fn merge_value(target: &mut Map<String, Value>, key: String, value: Value) {
    let Value::Object(incoming) = value else {
        target.insert(key, value);
        return;
    };
    if let Some(Value::Object(existing)) = target.get_mut(&key) {
        merge_entries(existing, incoming);
        return;
    }
    let mut fresh = Map::new();
    merge_entries(&mut fresh, incoming);
    target.insert(key, Value::Object(fresh));
}

/// Structural insert used while expanding: objects combine, deletion markers
/// are kept as plain keys.
fn insert_value(target: &mut Map<String, Value>, key: String, value: Value) {
    match (target.get_mut(&key), value) {
        (Some(Value::Object(existing)), Value::Object(incoming)) => {
            for (inner_key, inner_value) in incoming {
                insert_value(existing, inner_key, inner_value);
            }
        }
        (_, value) => {
            target.insert(key, value);
        }
    }
}

fn merge_entries(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match key.strip_prefix(DELETE_PREFIX) {
            Some(deleted) => {
                target.remove(deleted);
            }
            None => merge_value(target, key, value),
        }
    }
}

/// Read the value at a dotted path.
pub fn get_path<'a>(source: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split(PATH_SEPARATOR);
    let first = segments.next()?;
    let mut current = source.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write a value at a dotted path, creating intermediate objects as needed.
/// Non-object intermediates are replaced.
pub fn set_path(target: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut current = target;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(map) = entry else {
            return;
        };
        current = map;
    }
    insert_value(current, last.to_string(), value);
}

/// Remove the value at a dotted path. Returns the removed value.
pub fn remove_path(target: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match path.rsplit_once(PATH_SEPARATOR) {
        None => target.remove(path),
        Some((parent, last)) => {
            let mut current = target;
            for segment in parent.split(PATH_SEPARATOR) {
                current = current.get_mut(segment)?.as_object_mut()?;
            }
            current.remove(last)
        }
    }
}
