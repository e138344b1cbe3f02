//! Node resolver: picks the leaf widget for a primitive schema node and, in
//! search mode, pairs it with an operator picker.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, trace};

use crate::catalog::LeafProps;
use crate::error::FormError;
use crate::error_tree::{ErrorInput, ErrorTree};
use crate::mount::MountProps;
use crate::schema::{SchemaNode, SchemaRef};
use crate::ui::UiHints;
use crate::widget::{ChangeHandler, EnterHandler, Key, Mode, Widget};

/// Search comparison applied to a leaf value.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    Exact,
    StartsWith,
    EndsWith,
    Wildcard,
    /// Greater or equal.
    Greater,
    /// Less or equal.
    Less,
}

const TEXT_OPERATORS: &[Operator] = &[
    Operator::Exact,
    Operator::StartsWith,
    Operator::EndsWith,
    Operator::Wildcard,
];
const RANGE_OPERATORS: &[Operator] = &[Operator::Exact, Operator::Greater, Operator::Less];

/// Operators offered for a widget type. Empty means exact only, with no
/// picker shown.
pub fn operators_for(widget_type: &str) -> &'static [Operator] {
    match widget_type {
        "hidden" | "select" | "multiselectcsv" => &[],
        "text" | "textarea" => TEXT_OPERATORS,
        _ => RANGE_OPERATORS,
    }
}

/// Widget type for a primitive node: explicit hint, then `select` for
/// enumerated nodes, then the primitive type map.
pub fn resolve_widget_type(node: &dyn SchemaNode, hints: &UiHints) -> Result<String, FormError> {
    if let Some(widget) = &hints.widget {
        return Ok(widget.clone());
    }
    if node.options().is_some() || hints.options.is_some() {
        return Ok("select".to_string());
    }
    let type_name = node.type_name().unwrap_or_default();
    let widget = match type_name {
        "string" | "str" | "text" | "email" | "url" | "uuid" | "phone" => "text",
        "int" | "integer" | "float" | "number" | "decimal" => "number",
        "timestamp" => "timestamp",
        "boolean" => "bool",
        "bool" | "date" | "datetime" | "price" | "time" => type_name,
        other => return Err(FormError::UnmappedType(other.to_string())),
    };
    Ok(widget.to_string())
}

/// Operator selection of a search-mode leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorPicker {
    allowed: &'static [Operator],
    current: Operator,
}

impl OperatorPicker {
    pub fn new(allowed: &'static [Operator]) -> Self {
        Self {
            allowed,
            current: Operator::Exact,
        }
    }

    pub fn allowed(&self) -> &[Operator] {
        self.allowed
    }

    pub fn current(&self) -> Operator {
        self.current
    }

    /// Select `op`; returns `false` (and keeps the selection) if it is not
    /// offered.
    pub fn select(&mut self, op: Operator) -> bool {
        if self.allowed.contains(&op) {
            self.current = op;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.current = Operator::Exact;
    }
}

/// A resolved leaf plus its optional operator picker.
///
/// Change listeners see the composite value, so switching the operator is a
/// change of its own.
pub struct NodeWidget {
    leaf: Box<dyn Widget>,
    picker: Option<OperatorPicker>,
    original_operator: Operator,
    /// Mirror of the picker selection for the leaf's change callback.
    operator: Rc<Cell<Operator>>,
    /// Set while the node reports a change itself.
    muted: Rc<Cell<bool>>,
    on_change: Option<ChangeHandler>,
}

fn tagged(op: Operator, value: Value) -> Value {
    match op {
        Operator::Exact => value,
        _ if value.is_null() => value,
        op => json!({ "type": op, "value": value }),
    }
}

/// Split a search value into operator and raw value. Plain scalars are exact.
fn split_tagged(value: Value) -> (Option<Operator>, Value) {
    let op = value
        .as_object()
        .filter(|map| map.len() == 2 && map.contains_key("value"))
        .and_then(|map| map.get("type"))
        .and_then(Value::as_str)
        .and_then(|tag| tag.parse::<Operator>().ok());
    match (op, value) {
        (Some(op), Value::Object(mut map)) => (Some(op), map.remove("value").unwrap_or(Value::Null)),
        (_, value) => (None, value),
    }
}

impl NodeWidget {
    pub fn mount(node: &SchemaRef, value: Value, props: &MountProps) -> Result<Self, FormError> {
        let hints = props.hints_for(node);
        let widget_type = resolve_widget_type(node.as_ref(), &hints)?;
        trace!(widget_type, "node resolved");

        let mut picker = match props.mode {
            Mode::Search => {
                let allowed = operators_for(&widget_type);
                (!allowed.is_empty()).then(|| OperatorPicker::new(allowed))
            }
            _ => None,
        };
        let (op, value) = if props.mode == Mode::Search {
            split_tagged(value)
        } else {
            (None, value)
        };
        if let (Some(picker), Some(op)) = (picker.as_mut(), op) {
            picker.select(op);
        }

        let leaf = props.catalog.mount_leaf(LeafProps {
            widget_type,
            node: node.clone(),
            value,
            hints,
            mode: props.mode,
            label: props.label.clone(),
        })?;
        let original_operator = picker.as_ref().map(OperatorPicker::current).unwrap_or_default();
        Ok(Self {
            leaf,
            picker,
            original_operator,
            operator: Rc::new(Cell::new(original_operator)),
            muted: Rc::default(),
            on_change: None,
        })
    }

    pub fn leaf(&self) -> &dyn Widget {
        self.leaf.as_ref()
    }

    pub fn leaf_mut(&mut self) -> &mut dyn Widget {
        self.leaf.as_mut()
    }

    pub fn picker(&self) -> Option<&OperatorPicker> {
        self.picker.as_ref()
    }

    /// Current operator; exact when there is no picker.
    pub fn operator(&self) -> Operator {
        self.picker
            .as_ref()
            .map(OperatorPicker::current)
            .unwrap_or_default()
    }

    /// Select an operator. Returns `false` if it is not offered.
    pub fn set_operator(&mut self, op: Operator) -> bool {
        let old = self.value();
        let Some(picker) = self.picker.as_mut() else {
            return op == Operator::Exact;
        };
        if !picker.select(op) {
            return false;
        }
        self.operator.set(op);
        let new = self.value();
        if new != old {
            self.report(&new, &old);
        }
        true
    }

    fn report(&self, new: &Value, old: &Value) {
        if let Some(handler) = &self.on_change {
            handler(new, old);
        }
    }

    /// Run `edit` with the leaf callback muted, keeping the operator mirror in sync.
    fn quietly<T>(&mut self, edit: impl FnOnce(&mut Self) -> T) -> T {
        self.muted.set(true);
        let out = edit(self);
        self.operator.set(self.operator());
        self.muted.set(false);
        out
    }
}

impl Widget for NodeWidget {
    fn widget_type(&self) -> &str {
        self.leaf.widget_type()
    }

    fn value(&self) -> Value {
        tagged(self.operator(), self.leaf.value())
    }

    fn set_value(&mut self, value: Value) -> Result<(), FormError> {
        let (op, value) = match &self.picker {
            Some(_) => split_tagged(value),
            None => (None, value),
        };
        let old = self.value();
        let result = self.quietly(|node| {
            if let Some(picker) = node.picker.as_mut() {
                match op {
                    Some(op) if !picker.select(op) => {
                        debug!(%op, "operator not offered, using exact");
                        picker.reset();
                    }
                    Some(_) => {}
                    None => picker.reset(),
                }
            }
            node.leaf.set_value(value)
        });
        self.report(&self.value(), &old);
        result
    }

    fn valid(&mut self) -> bool {
        self.leaf.valid()
    }

    fn error(&mut self, errors: ErrorInput) -> Result<(), FormError> {
        self.leaf.error(errors)
    }

    fn displayed_error(&self) -> ErrorTree {
        self.leaf.displayed_error()
    }

    fn reset(&mut self) {
        let old = self.value();
        self.quietly(|node| {
            let original = node.original_operator;
            if let Some(picker) = node.picker.as_mut() {
                picker.select(original);
            }
            node.leaf.reset();
        });
        let new = self.value();
        if new != old {
            self.report(&new, &old);
        }
    }

    fn set_on_change(&mut self, handler: Option<ChangeHandler>) {
        self.on_change = handler.clone();
        let leaf_handler = handler.map(|handler| {
            let operator = self.operator.clone();
            let muted = self.muted.clone();
            Rc::new(move |new: &Value, old: &Value| {
                if !muted.get() {
                    let op = operator.get();
                    handler(&tagged(op, new.clone()), &tagged(op, old.clone()));
                }
            }) as ChangeHandler
        });
        self.leaf.set_on_change(leaf_handler);
    }

    fn set_on_enter(&mut self, handler: Option<EnterHandler>) {
        self.leaf.set_on_enter(handler);
    }

    fn handle_key(&mut self, key: Key) -> bool {
        self.leaf.handle_key(key)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::WidgetCatalog;
    use crate::schema::SchemaTree;
    use pretty_assertions::assert_eq;

    fn search_props() -> MountProps {
        MountProps::new(WidgetCatalog::with_builtins(), Mode::Search)
    }

    #[test]
    fn hint_beats_options_beats_type() {
        let plain = SchemaTree::node("string").build();
        assert_eq!(resolve_widget_type(plain.as_ref(), &UiHints::default()).unwrap(), "text");

        let enumerated = SchemaTree::node("string").options(vec![json!("a")]).build();
        assert_eq!(
            resolve_widget_type(enumerated.as_ref(), &UiHints::default()).unwrap(),
            "select"
        );

        let hinted = UiHints {
            widget: Some("textarea".into()),
            ..Default::default()
        };
        assert_eq!(resolve_widget_type(enumerated.as_ref(), &hinted).unwrap(), "textarea");
    }

    #[test]
    fn primitive_map() {
        for (ty, widget) in [
            ("email", "text"),
            ("decimal", "number"),
            ("timestamp", "timestamp"),
            ("price", "price"),
            ("date", "date"),
            ("bool", "bool"),
        ] {
            let node = SchemaTree::node(ty).build();
            assert_eq!(resolve_widget_type(node.as_ref(), &UiHints::default()).unwrap(), widget);
        }
    }

    #[test]
    fn unmapped_type_fails_fast() {
        let node = SchemaTree::node("geopoint").build();
        assert_eq!(
            resolve_widget_type(node.as_ref(), &UiHints::default()).unwrap_err(),
            FormError::UnmappedType("geopoint".into())
        );
    }

    #[test]
    fn operator_sets_by_widget_type() {
        assert!(operators_for("select").is_empty());
        assert_eq!(operators_for("textarea"), TEXT_OPERATORS);
        assert_eq!(operators_for("date"), RANGE_OPERATORS);
    }

    #[test]
    fn search_value_is_tagged_unless_exact() {
        let node = SchemaTree::node("int").build();
        let mut w = NodeWidget::mount(&node, json!(10), &search_props()).unwrap();
        assert_eq!(w.value(), json!(10));

        assert!(w.set_operator(Operator::Greater));
        assert_eq!(w.value(), json!({"type": "greater", "value": 10}));

        w.set_value(json!({"type": "less", "value": 3})).unwrap();
        assert_eq!(w.operator(), Operator::Less);
        assert_eq!(w.leaf().value(), json!(3));

        w.set_value(json!(7)).unwrap();
        assert_eq!(w.operator(), Operator::Exact);
        assert_eq!(w.value(), json!(7));
    }

    #[test]
    fn listeners_see_composite_values() {
        let node = SchemaTree::node("int").build();
        let mut w = NodeWidget::mount(&node, json!(10), &search_props()).unwrap();
        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = seen.clone();
        w.set_on_change(Some(Rc::new(move |new: &Value, old: &Value| {
            sink.borrow_mut().push((new.clone(), old.clone()));
        })));

        assert!(w.set_operator(Operator::Greater));
        assert!(w.set_operator(Operator::Greater));
        w.leaf_mut().set_value(json!(11)).unwrap();
        w.set_value(json!(5)).unwrap();
        w.reset();

        let greater = |v: i64| json!({"type": "greater", "value": v});
        assert_eq!(
            *seen.borrow(),
            vec![
                (greater(10), json!(10)),
                (greater(11), greater(10)),
                (json!(5), greater(11)),
                (json!(10), json!(5)),
            ]
        );
    }

    #[test]
    fn select_in_search_mode_has_no_picker() {
        let node = SchemaTree::node("string").options(vec![json!("a")]).build();
        let mut w = NodeWidget::mount(&node, Value::Null, &search_props()).unwrap();
        assert!(w.picker().is_none());
        assert!(!w.set_operator(Operator::Wildcard));
        assert!(w.valid());
    }

    #[test]
    fn text_rejects_range_operators() {
        let node = SchemaTree::node("string").build();
        let mut w = NodeWidget::mount(&node, json!("ab"), &search_props()).unwrap();
        assert!(!w.set_operator(Operator::Greater));
        w.set_value(json!({"type": "greater", "value": "x"})).unwrap();
        assert_eq!(w.operator(), Operator::Exact);
        assert_eq!(w.value(), json!("x"));
    }

    #[test]
    fn create_mode_keeps_objects_untouched() {
        let node = SchemaTree::node("string").build();
        let props = MountProps::new(WidgetCatalog::with_builtins(), Mode::Create);
        let w = NodeWidget::mount(&node, json!("plain"), &props).unwrap();
        assert!(w.picker().is_none());
        assert_eq!(w.value(), json!("plain"));
    }
}
