//! Backend camelCase payloads mapped to the snake_case shapes the storefront
//! consumes. Fields the adapters do not know about are kept.

pub mod order;
pub mod payment;
pub mod rider;
pub mod user;

use serde_json::{Map, Value as JsonValue};

/// Loosely "set": not null, not `false`, not `""`, not zero.
pub(crate) fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        _ => true,
    }
}

/// Sets `snake` from `camel` when the camelCase value is truthy, otherwise
/// leaves whatever snake_case value the source already carried.
pub(crate) fn prefer_truthy(target: &mut Map<String, JsonValue>, camel: &str, snake: &str) {
    if let Some(value) = target.get(camel).filter(|v| is_truthy(v)).cloned() {
        target.insert(snake.to_string(), value);
    }
}

/// Sets `snake` from `camel` whenever the camelCase key is present, even if
/// it holds `false` or `null`.
pub(crate) fn prefer_present(target: &mut Map<String, JsonValue>, camel: &str, snake: &str) {
    if let Some(value) = target.get(camel).cloned() {
        target.insert(snake.to_string(), value);
    }
}

/// Applies the truthy and presence mappings to a copy of `source`.
/// Non-objects are returned unchanged.
pub(crate) fn remap(
    source: &JsonValue,
    truthy: &[(&str, &str)],
    present: &[(&str, &str)],
) -> JsonValue {
    let Some(object) = source.as_object() else {
        return source.clone();
    };
    let mut target = object.clone();
    for (camel, snake) in truthy {
        prefer_truthy(&mut target, camel, snake);
    }
    for (camel, snake) in present {
        prefer_present(&mut target, camel, snake);
    }
    JsonValue::Object(target)
}
