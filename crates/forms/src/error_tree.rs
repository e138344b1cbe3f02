//! Error trees and the reshaping of flat validation failures.
//!
//! The schema authority reports failures as a flat list of
//! `(dotted.path, reason)` pairs. Structural widgets route errors one level at
//! a time, so the flat list is folded into an [`ErrorTree`] first: every dotted
//! segment becomes one nesting level.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::path::FieldPath;
use crate::schema::ValidationFailure;

/// Per-field error state mirroring the value tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ErrorTree {
    /// No error at this position.
    #[default]
    Clear,
    /// A reason (or already localized message) for this position.
    Message(String),
    /// Errors of nested fields, keyed by field name or element index.
    Branch(BTreeMap<String, ErrorTree>),
}

impl ErrorTree {
    pub fn message(msg: impl Into<String>) -> Self {
        ErrorTree::Message(msg.into())
    }

    pub fn is_clear(&self) -> bool {
        match self {
            ErrorTree::Clear => true,
            ErrorTree::Message(_) => false,
            ErrorTree::Branch(map) => map.values().all(ErrorTree::is_clear),
        }
    }

    /// Message at this exact position, if any.
    pub fn as_message(&self) -> Option<&str> {
        match self {
            ErrorTree::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ErrorTree> {
        match self {
            ErrorTree::Branch(map) => map.get(key),
            _ => None,
        }
    }

    /// Follow a dotted path (`"address.city"`).
    pub fn at(&self, path: &str) -> Option<&ErrorTree> {
        FieldPath::parse(path)
            .segments()
            .iter()
            .try_fold(self, |node, seg| node.get(seg))
    }

    /// First message found in depth-first key order.
    pub fn first_message(&self) -> Option<&str> {
        match self {
            ErrorTree::Clear => None,
            ErrorTree::Message(m) => Some(m),
            ErrorTree::Branch(map) => map.values().find_map(ErrorTree::first_message),
        }
    }

    /// JSON rendering: `false` for no error, a string, or a nested object.
    pub fn to_json(&self) -> Value {
        match self {
            ErrorTree::Clear => Value::Bool(false),
            ErrorTree::Message(m) => Value::String(m.clone()),
            ErrorTree::Branch(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }

    /// Inverse of [`ErrorTree::to_json`]. A list of `[path, reason]` pairs is
    /// reshaped; anything unrecognised counts as no error.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => ErrorTree::Message(s.clone()),
            Value::Object(map) => ErrorTree::Branch(
                map.iter()
                    .map(|(k, v)| (k.clone(), ErrorTree::from_json(v)))
                    .collect(),
            ),
            Value::Array(pairs) => {
                let failures: Vec<ValidationFailure> = pairs
                    .iter()
                    .filter_map(|pair| {
                        let path = pair.get(0)?.as_str()?;
                        let reason = pair.get(1)?.as_str()?;
                        Some(ValidationFailure::new(path, reason))
                    })
                    .collect();
                reshape_errors(&failures)
            }
            _ => ErrorTree::Clear,
        }
    }

    /// Insert `reason` at `path`, keeping whatever was recorded first.
    fn insert(&mut self, path: &[String], reason: &str) {
        let Some((head, rest)) = path.split_first() else {
            if matches!(self, ErrorTree::Clear) {
                *self = ErrorTree::Message(reason.to_string());
            }
            return;
        };
        match self {
            ErrorTree::Message(_) => {}
            ErrorTree::Clear => {
                let mut child = ErrorTree::Clear;
                child.insert(rest, reason);
                let mut map = BTreeMap::new();
                map.insert(head.clone(), child);
                *self = ErrorTree::Branch(map);
            }
            ErrorTree::Branch(map) => map
                .entry(head.clone())
                .or_default()
                .insert(rest, reason),
        }
    }
}

impl Serialize for ErrorTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Errors handed to a widget's `error()` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorInput {
    Clear,
    Message(String),
    /// Flat `(path, reason)` list; reshaped before routing.
    Failures(Vec<ValidationFailure>),
    /// Already nested; routed as is.
    Tree(ErrorTree),
}

impl ErrorInput {
    pub fn into_tree(self) -> ErrorTree {
        match self {
            ErrorInput::Clear => ErrorTree::Clear,
            ErrorInput::Message(m) => ErrorTree::Message(m),
            ErrorInput::Failures(failures) => reshape_errors(&failures),
            ErrorInput::Tree(tree) => tree,
        }
    }
}

impl From<&str> for ErrorInput {
    fn from(msg: &str) -> Self {
        ErrorInput::Message(msg.to_string())
    }
}

impl From<String> for ErrorInput {
    fn from(msg: String) -> Self {
        ErrorInput::Message(msg)
    }
}

impl From<Vec<ValidationFailure>> for ErrorInput {
    fn from(failures: Vec<ValidationFailure>) -> Self {
        ErrorInput::Failures(failures)
    }
}

impl From<ErrorTree> for ErrorInput {
    fn from(tree: ErrorTree) -> Self {
        ErrorInput::Tree(tree)
    }
}

/// Canonical reason code. A required string left empty is reported by the
/// authority as a type mismatch; users should read "missing".
pub fn canonical_reason(reason: &str) -> &str {
    match reason {
        "is not a string" => "missing",
        other => other,
    }
}

/// Fold flat failures into a tree. For each path only the first failure is
/// kept.
pub fn reshape_errors(failures: &[ValidationFailure]) -> ErrorTree {
    let mut tree = ErrorTree::Clear;
    for failure in failures {
        let path = FieldPath::parse(&failure.path);
        tree.insert(path.segments(), canonical_reason(&failure.reason));
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn failures(pairs: &[(&str, &str)]) -> Vec<ValidationFailure> {
        pairs
            .iter()
            .map(|(p, r)| ValidationFailure::new(*p, *r))
            .collect()
    }

    #[test]
    fn dotted_paths_become_nested_keys() {
        let tree = reshape_errors(&failures(&[("a.b", "x"), ("a.c", "y")]));
        assert_eq!(tree.to_json(), json!({"a": {"b": "x", "c": "y"}}));
    }

    #[test]
    fn not_a_string_reads_as_missing() {
        let tree = reshape_errors(&failures(&[("a", "is not a string")]));
        assert_eq!(tree.to_json(), json!({"a": "missing"}));
    }

    #[test]
    fn nested_input_is_untouched() {
        let nested = ErrorTree::from_json(&json!({"a": {"b": "x"}, "c": "y"}));
        let again = ErrorInput::Tree(nested.clone()).into_tree();
        assert_eq!(again, nested);
    }

    #[test]
    fn first_failure_per_path_wins() {
        let tree = reshape_errors(&failures(&[("a", "missing"), ("a", "regex"), ("a.b", "x")]));
        assert_eq!(tree.to_json(), json!({"a": "missing"}));
    }

    #[test]
    fn empty_path_is_root_message() {
        let tree = reshape_errors(&failures(&[("", "minimum")]));
        assert_eq!(tree, ErrorTree::message("minimum"));
    }

    #[test]
    fn json_pair_list_is_reshaped() {
        let tree = ErrorTree::from_json(&json!([["tags.1", "regex"]]));
        assert_eq!(tree.at("tags.1").and_then(ErrorTree::as_message), Some("regex"));
    }

    #[test]
    fn clear_detection_is_deep() {
        let tree = ErrorTree::from_json(&json!({"a": false, "b": {"c": false}}));
        assert!(tree.is_clear());
        assert_eq!(tree.first_message(), None);
    }
}
