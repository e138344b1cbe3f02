//! Helpers over plain value trees (`serde_json::Value`).
//!
//! A value tree mirrors the schema shape. `null` (or absence) is "no value";
//! leaf widgets never report an empty string, they report `null` instead.

use serde_json::Value;

/// `true` for values the engine treats as "nothing entered".
///
/// `null`, `""`, `[]` and `{}` are empty. A container holding only empty
/// values is *not* empty: `[null]` still has one element.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Canonical leaf form: an empty string becomes `null`.
pub fn canonical_leaf(value: Value) -> Value {
    match value {
        Value::String(s) if s.is_empty() => Value::Null,
        other => other,
    }
}

/// Deep canonical form used for change detection: `""` becomes `null` and
/// object entries holding an empty value are dropped.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::String(s) if s.is_empty() => Value::Null,
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Structural "differs" check on canonical forms.
pub fn differs(a: &Value, b: &Value) -> bool {
    canonicalize(a) != canonicalize(b)
}

/// String form of a scalar used as a lookup key (option tables, labels).
pub fn key_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
