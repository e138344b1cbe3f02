use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use super::{MinMax, NodeClass, SchemaNode, SchemaRef, ValidationFailure};
use crate::error::FormError;
use crate::path::join;
use crate::ui::UiHints;
use crate::value::canonical_leaf;

const STRING_TYPES: &[&str] = &[
    "string", "str", "text", "email", "url", "uuid", "phone", "date", "datetime", "time",
];
const NUMBER_TYPES: &[&str] = &[
    "int", "integer", "float", "number", "decimal", "timestamp", "price",
];
const BOOL_TYPES: &[&str] = &["bool", "boolean"];

/// Reference schema authority.
///
/// Build nodes with [`SchemaTree::node`], [`SchemaTree::array`],
/// [`SchemaTree::hash`] and [`SchemaTree::parent`], or deserialize a
/// [`super::SchemaSpec`].
///
/// ```ignore
/// let person = SchemaTree::parent()
///     .field("name", SchemaTree::node("string").required().build())
///     .field("age", SchemaTree::node("int").min(0.0).build())
///     .field("tags", SchemaTree::array(SchemaTree::node("string").build()).build())
///     .build();
/// ```
pub struct SchemaTree {
    class: NodeClass,
    type_name: Option<String>,
    required: bool,
    options: Option<Vec<Value>>,
    minmax: MinMax,
    regex: Option<Regex>,
    ui: RefCell<Option<UiHints>>,
    fields: IndexMap<String, SchemaRef>,
    child: Option<SchemaRef>,
}

/// Fluent constructor for [`SchemaTree`] nodes.
pub struct SchemaBuilder {
    tree: SchemaTree,
}

impl SchemaTree {
    fn with_class(class: NodeClass) -> Self {
        Self {
            class,
            type_name: None,
            required: false,
            options: None,
            minmax: MinMax::default(),
            regex: None,
            ui: RefCell::new(None),
            fields: IndexMap::new(),
            child: None,
        }
    }

    /// Primitive leaf of the given type (`"string"`, `"int"`, `"date"`, ...).
    pub fn node(type_name: impl Into<String>) -> SchemaBuilder {
        let mut tree = Self::with_class(NodeClass::Node);
        tree.type_name = Some(type_name.into());
        SchemaBuilder { tree }
    }

    pub fn array(child: SchemaRef) -> SchemaBuilder {
        let mut tree = Self::with_class(NodeClass::ArrayNode);
        tree.child = Some(child);
        SchemaBuilder { tree }
    }

    pub fn hash() -> SchemaBuilder {
        SchemaBuilder {
            tree: Self::with_class(NodeClass::HashNode),
        }
    }

    pub fn parent() -> SchemaBuilder {
        SchemaBuilder {
            tree: Self::with_class(NodeClass::Parent),
        }
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    fn is_type(&self, group: &[&str]) -> bool {
        self.type_name
            .as_deref()
            .is_some_and(|t| group.contains(&t))
    }

    fn check_leaf(&self, value: &Value, out: &mut Vec<ValidationFailure>) {
        let value = canonical_leaf(value.clone());
        if value.is_null() {
            if self.required {
                let reason = if self.is_type(STRING_TYPES) {
                    "is not a string"
                } else {
                    "missing"
                };
                out.push(ValidationFailure::new("", reason));
            }
            return;
        }

        if self.is_type(STRING_TYPES) && !value.is_string() {
            out.push(ValidationFailure::new("", "is not a string"));
            return;
        }
        if self.is_type(NUMBER_TYPES) && !value.is_number() {
            out.push(ValidationFailure::new("", "is not a number"));
            return;
        }
        if self.is_type(BOOL_TYPES) && !value.is_boolean() {
            out.push(ValidationFailure::new("", "is not a boolean"));
            return;
        }

        if let Some(options) = &self.options {
            if !options.contains(&value) {
                out.push(ValidationFailure::new("", "not an option"));
                return;
            }
        }

        let measure = match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => Some(s.chars().count() as f64),
            _ => None,
        };
        if let Some(m) = measure {
            self.check_bounds(m, out);
        }

        if let (Some(re), Value::String(s)) = (&self.regex, &value) {
            if !re.is_match(s) {
                out.push(ValidationFailure::new("", "regex"));
            }
        }
    }

    fn check_bounds(&self, measure: f64, out: &mut Vec<ValidationFailure>) {
        if self.minmax.minimum.is_some_and(|min| measure < min) {
            out.push(ValidationFailure::new("", "minimum"));
        } else if self.minmax.maximum.is_some_and(|max| measure > max) {
            out.push(ValidationFailure::new("", "maximum"));
        }
    }

    fn check_array(&self, value: &Value, out: &mut Vec<ValidationFailure>) {
        let items = match value {
            Value::Null => {
                if self.required {
                    out.push(ValidationFailure::new("", "missing"));
                }
                return;
            }
            Value::Array(items) => items,
            _ => {
                out.push(ValidationFailure::new("", "is not an array"));
                return;
            }
        };
        self.check_bounds(items.len() as f64, out);
        let Some(child) = &self.child else {
            return;
        };
        for (i, item) in items.iter().enumerate() {
            if let Err(failures) = child.valid(item) {
                out.extend(prefixed(&i.to_string(), failures));
            }
        }
    }

    fn check_object(&self, value: &Value, out: &mut Vec<ValidationFailure>) {
        if value.is_null() {
            if self.required {
                out.push(ValidationFailure::new("", "missing"));
            }
            return;
        }
        if !value.is_object() {
            out.push(ValidationFailure::new("", "is not an object"));
            return;
        }
        for (name, field) in &self.fields {
            let v = value.get(name).unwrap_or(&Value::Null);
            if let Err(failures) = field.valid(v) {
                out.extend(prefixed(name, failures));
            }
        }
    }
}

fn prefixed(
    prefix: &str,
    failures: Vec<ValidationFailure>,
) -> impl Iterator<Item = ValidationFailure> + '_ {
    failures
        .into_iter()
        .map(move |f| ValidationFailure::new(join(prefix, &f.path), f.reason))
}

impl SchemaBuilder {
    pub fn required(mut self) -> Self {
        self.tree.required = true;
        self
    }

    pub fn options(mut self, options: Vec<Value>) -> Self {
        self.tree.options = Some(options);
        self
    }

    pub fn min(mut self, minimum: f64) -> Self {
        self.tree.minmax.minimum = Some(minimum);
        self
    }

    pub fn max(mut self, maximum: f64) -> Self {
        self.tree.minmax.maximum = Some(maximum);
        self
    }

    /// Strings must match `pattern`.
    pub fn regex(mut self, pattern: &str) -> Result<Self, FormError> {
        let re = Regex::new(pattern)
            .map_err(|e| FormError::InvalidSchema(format!("regex `{pattern}`: {e}")))?;
        self.tree.regex = Some(re);
        Ok(self)
    }

    pub fn ui(self, hints: UiHints) -> Self {
        *self.tree.ui.borrow_mut() = Some(hints);
        self
    }

    /// Append a named child (`Parent` only; ignored for other classes).
    pub fn field(mut self, name: impl Into<String>, node: SchemaRef) -> Self {
        self.tree.fields.insert(name.into(), node);
        self
    }

    pub fn build(self) -> SchemaRef {
        Rc::new(self.tree)
    }
}

impl SchemaNode for SchemaTree {
    fn class_name(&self) -> &str {
        self.class.as_ref()
    }

    fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    fn options(&self) -> Option<Vec<Value>> {
        self.options.clone()
    }

    fn minmax(&self) -> MinMax {
        self.minmax
    }

    fn ui(&self) -> Option<UiHints> {
        self.ui.borrow().clone()
    }

    fn set_ui(&self, hints: UiHints) {
        *self.ui.borrow_mut() = Some(hints);
    }

    fn valid(&self, value: &Value) -> Result<(), Vec<ValidationFailure>> {
        let mut failures = Vec::new();
        match self.class {
            NodeClass::Node => self.check_leaf(value, &mut failures),
            NodeClass::ArrayNode => self.check_array(value, &mut failures),
            NodeClass::Parent | NodeClass::HashNode => self.check_object(value, &mut failures),
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }

    fn get(&self, field: &str) -> Option<SchemaRef> {
        self.fields.get(field).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn child(&self) -> Option<SchemaRef> {
        self.child.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn reasons(node: &SchemaRef, value: Value) -> Vec<(String, String)> {
        match node.valid(&value) {
            Ok(()) => vec![],
            Err(f) => f.into_iter().map(|f| (f.path, f.reason)).collect(),
        }
    }

    #[test]
    fn required_string_reports_type_mismatch_when_empty() {
        let name = SchemaTree::node("string").required().build();
        assert_eq!(
            reasons(&name, json!("")),
            vec![("".into(), "is not a string".into())]
        );
        assert!(reasons(&name, json!("Bob")).is_empty());
    }

    #[test]
    fn optional_values_accept_null() {
        let age = SchemaTree::node("int").build();
        assert!(reasons(&age, Value::Null).is_empty());
        assert_eq!(
            reasons(&age, json!("five")),
            vec![("".into(), "is not a number".into())]
        );
    }

    #[test]
    fn bounds_apply_to_numbers_strings_and_arrays() {
        let n = SchemaTree::node("int").min(1.0).max(3.0).build();
        assert_eq!(reasons(&n, json!(0))[0].1, "minimum");
        assert_eq!(reasons(&n, json!(4))[0].1, "maximum");

        let s = SchemaTree::node("string").max(2.0).build();
        assert_eq!(reasons(&s, json!("abc"))[0].1, "maximum");

        let a = SchemaTree::array(SchemaTree::node("string").build())
            .min(1.0)
            .build();
        assert_eq!(reasons(&a, json!([]))[0].1, "minimum");
    }

    #[test]
    fn nested_failures_carry_dotted_paths() {
        let schema = SchemaTree::parent()
            .field("name", SchemaTree::node("string").required().build())
            .field(
                "tags",
                SchemaTree::array(SchemaTree::node("string").regex("^[a-z]+$").unwrap().build())
                    .build(),
            )
            .build();
        assert_eq!(
            reasons(&schema, json!({"name": null, "tags": ["ok", "NO"]})),
            vec![
                ("name".into(), "is not a string".into()),
                ("tags.1".into(), "regex".into()),
            ]
        );
    }

    #[test]
    fn options_restrict_values() {
        let lang = SchemaTree::node("string")
            .options(vec![json!("de"), json!("en")])
            .build();
        assert!(reasons(&lang, json!("de")).is_empty());
        assert_eq!(reasons(&lang, json!("fr"))[0].1, "not an option");
    }

    #[test]
    fn invalid_regex_is_a_schema_error() {
        let err = SchemaTree::node("string").regex("(").err();
        assert!(matches!(err, Some(FormError::InvalidSchema(_))));
    }

    #[test]
    fn ui_hints_can_be_replaced() {
        let node = SchemaTree::node("string").build();
        assert!(node.ui().is_none());
        node.set_ui(UiHints {
            title: Some("Name".into()),
            ..Default::default()
        });
        assert_eq!(node.ui().and_then(|h| h.title).as_deref(), Some("Name"));
    }
}
