//! Helpers for expanding user models into remote payloads and flattening
//! remote models back.
//!
//! Everything here is pure: no I/O, no clocks. Paths are dot separated and
//! use numeric segments for array indices (`properties.sku.name`,
//! `extension.0.name`).

use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// Server-managed paths removed before a fetched model is sent back.
pub const SERVER_MANAGED: &[&str] = &["systemData", "etag", "properties.provisioningState"];

/// Look up a dotted path.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Look up a dotted path in an object map.
pub fn lookup_in<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let (head, rest) = path.split_once('.').unwrap_or((path, ""));
    map.get(head).and_then(|v| lookup(v, rest))
}

/// Set a dotted path, creating intermediate objects.
///
/// Fails when an intermediate segment exists and is not an object.
pub fn set_path(value: &mut Value, path: &str, new: Value) -> Result<()> {
    let mut current = value;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return Err(Error::decode(path, format!("{segment} is not inside an object")));
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), new);
            return Ok(());
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Ok(())
}

/// Remove a dotted path. Missing paths are ignored.
pub fn remove_path(value: &mut Value, path: &str) -> Option<Value> {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (lookup_mut(value, parent)?, leaf),
        None => (value, path),
    };
    parent.as_object_mut()?.remove(leaf)
}

fn lookup_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

/// Remove server-managed fields from a fetched model before sending it back.
pub fn clear_server_managed(model: &mut Value) {
    for path in SERVER_MANAGED {
        remove_path(model, path);
    }
}

/// Insert `key` only when a value is given.
pub fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<impl Into<Value>>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value.into());
    }
}

/// Whether a value is null or the zero value of its type.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Serialize a user-facing enum value to its canonical remote spelling.
///
/// Matching is case-insensitive; no match is a validation error on `field`.
pub fn expand_enum(value: &str, allowed: &[&str], field: &str) -> Result<String> {
    allowed
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(value))
        .map(|candidate| (*candidate).to_string())
        .ok_or_else(|| {
            Error::validation(
                field,
                format!("expected one of [{}], got {value:?}", allowed.join(", ")),
            )
        })
}

/// Flatten a remote enum value to its canonical spelling.
///
/// Unknown values are passed through unchanged and logged.
pub fn flatten_enum(value: Option<&str>, allowed: &[&str], field: &str) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match allowed.iter().find(|c| c.eq_ignore_ascii_case(value)) {
        Some(canonical) => (*canonical).to_string(),
        None => {
            log::warn!("{field}: passing through unknown value {value:?}");
            value.to_string()
        }
    }
}

/// String at `path`, or empty.
pub fn str_at(value: &Value, path: &str) -> String {
    lookup(value, path)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Integer at `path`, or zero.
pub fn int_at(value: &Value, path: &str) -> i64 {
    lookup(value, path).and_then(Value::as_i64).unwrap_or_default()
}

/// Boolean at `path`, or `false`.
pub fn bool_at(value: &Value, path: &str) -> bool {
    lookup(value, path)
        .and_then(Value::as_bool)
        .unwrap_or_default()
}

/// List of strings at `path`; non-string entries are skipped.
pub fn strings_at(value: &Value, path: &str) -> Vec<String> {
    lookup(value, path)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Copy only the `writable` keys of `source` into a new object.
///
/// Used for collections the service decorates with read-only entries: the
/// read-only keys are never echoed back.
pub fn copy_writable(source: &Value, writable: &[&str]) -> Value {
    let mut out = Map::new();
    if let Value::Object(map) = source {
        for key in writable {
            if let Some(value) = map.get(*key).filter(|v| !v.is_null()) {
                out.insert((*key).to_string(), value.clone());
            }
        }
    }
    Value::Object(out)
}
