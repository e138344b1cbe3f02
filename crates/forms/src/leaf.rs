//! Built-in leaf widgets.
//!
//! All primitive widgets share one state machine, [`InputWidget`]; the
//! [`InputKind`] only decides how raw input is coerced and whether an option
//! list is attached. Drawing them is up to the renderer.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use regex::Regex;
use serde_json::{Number, Value};
use strum::{Display, EnumString};
use tracing::trace;

use crate::catalog::{LeafFactory, LeafProps, WidgetCatalog};
use crate::error::FormError;
use crate::error_tree::{canonical_reason, ErrorInput, ErrorTree};
use crate::options::{OptionItem, OptionsSource, Subscriber};
use crate::schema::SchemaRef;
use crate::ui::{OptionsHint, UiHints};
use crate::value::{canonical_leaf, key_string};
use crate::widget::{ChangeHandler, EnterHandler, Key, Mode, Widget};

/// Input behavior of a leaf widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum InputKind {
    Text,
    /// Numeric strings are parsed.
    Number,
    /// `"true"` / `"false"` are parsed.
    Bool,
    /// Dates and times, kept as strings.
    Temporal,
    Select,
    /// Lists are joined into one comma separated string.
    MultiSelectCsv,
    Hidden,
}

impl InputKind {
    fn has_options(self) -> bool {
        matches!(self, InputKind::Select | InputKind::MultiSelectCsv)
    }
}

/// Register the built-in leaf widgets on `catalog`.
pub fn register_builtins(catalog: &WidgetCatalog) {
    let builtins = [
        ("text", InputKind::Text),
        ("textarea", InputKind::Text),
        ("number", InputKind::Number),
        ("timestamp", InputKind::Number),
        ("price", InputKind::Number),
        ("bool", InputKind::Bool),
        ("date", InputKind::Temporal),
        ("datetime", InputKind::Temporal),
        ("time", InputKind::Temporal),
        ("select", InputKind::Select),
        ("multiselectcsv", InputKind::MultiSelectCsv),
        ("hidden", InputKind::Hidden),
    ];
    for (name, kind) in builtins {
        catalog.register_leaf(name, InputWidget::factory(kind), None);
    }
}

/// Live subscription to an options source; released on drop.
struct Subscription {
    source: OptionsSource,
    subscriber: Subscriber,
}

/// Leaf widget holding one primitive value.
pub struct InputWidget {
    kind: InputKind,
    widget_type: String,
    node: SchemaRef,
    hints: UiHints,
    mode: Mode,
    label: Option<String>,
    regex: Option<Regex>,
    original: Value,
    value: Value,
    /// Reason code or externally supplied message.
    error: Option<String>,
    options: Rc<RefCell<Vec<OptionItem>>>,
    subscription: Option<Subscription>,
    on_change: Option<ChangeHandler>,
    on_enter: Option<EnterHandler>,
}

impl InputWidget {
    pub fn new(kind: InputKind, props: LeafProps) -> Result<Self, FormError> {
        let regex = props
            .hints
            .regex
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| FormError::InvalidSchema(format!("ui regex `{pattern}`: {e}")))
            })
            .transpose()?;

        let mut widget = Self {
            kind,
            widget_type: props.widget_type,
            node: props.node,
            hints: props.hints,
            mode: props.mode,
            label: props.label,
            regex,
            original: Value::Null,
            value: Value::Null,
            error: None,
            options: Rc::new(RefCell::new(Vec::new())),
            subscription: None,
            on_change: None,
            on_enter: None,
        };
        let initial = widget.coerce(props.value);
        widget.original = initial.clone();
        widget.value = initial;
        if kind.has_options() {
            widget.attach_options();
        }
        Ok(widget)
    }

    /// Factory registering `kind` in a catalog.
    pub fn factory(kind: InputKind) -> LeafFactory {
        Rc::new(move |props| Ok(Box::new(InputWidget::new(kind, props)?)))
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref().or(self.hints.title.as_deref())
    }

    pub fn hints(&self) -> &UiHints {
        &self.hints
    }

    /// Option list currently offered (empty for non-select kinds).
    pub fn options(&self) -> Vec<OptionItem> {
        self.options.borrow().clone()
    }

    /// Raw error reason or message, before hint mapping.
    pub fn error_reason(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn attach_options(&mut self) {
        match self.hints.options.clone() {
            Some(OptionsHint::Source(source)) => {
                let sink = Rc::downgrade(&self.options);
                let subscriber: Subscriber = Rc::new(move |items: &[OptionItem]| {
                    if let Some(sink) = sink.upgrade() {
                        *sink.borrow_mut() = items.to_vec();
                    }
                });
                *self.options.borrow_mut() = source.subscribe(subscriber.clone());
                self.subscription = Some(Subscription { source, subscriber });
            }
            Some(hint) => *self.options.borrow_mut() = hint.items(),
            None => {
                let raw = self.node.options().unwrap_or_default();
                *self.options.borrow_mut() = raw.iter().map(OptionItem::from_raw).collect();
            }
        }
    }

    fn coerce(&self, raw: Value) -> Value {
        let coerced = match (self.kind, raw) {
            (InputKind::Number, Value::String(s)) => parse_number(&s).unwrap_or(Value::String(s)),
            (InputKind::Bool, Value::String(s)) => {
                let parsed = match s.trim() {
                    "true" => Some(true),
                    "false" => Some(false),
                    _ => None,
                };
                parsed.map(Value::Bool).unwrap_or(Value::String(s))
            }
            (InputKind::MultiSelectCsv, Value::Array(items)) => {
                let sep = if self.hints.extra_space.unwrap_or(false) {
                    ", "
                } else {
                    ","
                };
                let parts: Vec<String> = items.iter().map(key_string).collect();
                Value::String(parts.join(sep))
            }
            (_, other) => other,
        };
        canonical_leaf(coerced)
    }

    /// First failure reason for the current value. A `regex` hint replaces
    /// the schema's own pattern.
    fn check(&self) -> Option<String> {
        if self.mode == Mode::Search && self.value.is_null() {
            return None;
        }
        if let Err(failures) = self.node.valid(&self.value) {
            let overridden = self.regex.is_some();
            if let Some(failure) = failures
                .into_iter()
                .find(|f| !(overridden && f.reason == "regex"))
            {
                return Some(failure.reason);
            }
        }
        match (&self.regex, &self.value) {
            (Some(re), Value::String(s)) if !re.is_match(s) => Some("regex".to_string()),
            _ => None,
        }
    }

    fn fire_change(&self, old: &Value) {
        if let Some(handler) = &self.on_change {
            handler(&self.value, old);
        }
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

impl Drop for InputWidget {
    fn drop(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.source.unsubscribe(&sub.subscriber);
            trace!(widget = %self.widget_type, "options subscription released");
        }
    }
}

impl Widget for InputWidget {
    fn widget_type(&self) -> &str {
        &self.widget_type
    }

    fn value(&self) -> Value {
        self.value.clone()
    }

    fn set_value(&mut self, value: Value) -> Result<(), FormError> {
        let new = self.coerce(value);
        let old = std::mem::replace(&mut self.value, new);
        self.error = self.check();
        self.fire_change(&old);
        Ok(())
    }

    fn valid(&mut self) -> bool {
        self.error = self.check();
        self.error.is_none()
    }

    fn error(&mut self, errors: ErrorInput) -> Result<(), FormError> {
        self.error = match errors.into_tree() {
            ErrorTree::Clear => None,
            ErrorTree::Message(m) => Some(m),
            tree => tree.first_message().map(str::to_string),
        };
        Ok(())
    }

    fn displayed_error(&self) -> ErrorTree {
        match &self.error {
            Some(reason) => ErrorTree::message(self.hints.message_for(canonical_reason(reason))),
            None => ErrorTree::Clear,
        }
    }

    fn reset(&mut self) {
        let old = std::mem::replace(&mut self.value, self.original.clone());
        self.error = None;
        if old != self.value {
            self.fire_change(&old);
        }
    }

    fn set_on_change(&mut self, handler: Option<ChangeHandler>) {
        self.on_change = handler;
    }

    fn set_on_enter(&mut self, handler: Option<EnterHandler>) {
        self.on_enter = handler;
    }

    fn handle_key(&mut self, key: Key) -> bool {
        match (key, &self.on_enter) {
            (Key::Enter, Some(handler)) => {
                handler();
                true
            }
            _ => false,
        }
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
    use crate::schema::SchemaTree;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::Cell;
    use std::collections::BTreeMap;

    fn input(kind: InputKind, node: SchemaRef, value: Value, hints: UiHints) -> InputWidget {
        InputWidget::new(
            kind,
            LeafProps {
                widget_type: kind.to_string(),
                node,
                value,
                hints,
                mode: Mode::Create,
                label: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn empty_string_reads_as_null() {
        let mut w = input(InputKind::Text, SchemaTree::node("string").build(), json!("x"), UiHints::default());
        w.set_value(json!("")).unwrap();
        assert_eq!(w.value(), Value::Null);
    }

    #[test]
    fn change_handler_sees_committed_state() {
        let mut w = input(InputKind::Number, SchemaTree::node("int").build(), json!(1), UiHints::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        w.set_on_change(Some(Rc::new(move |new: &Value, old: &Value| {
            sink.borrow_mut().push((new.clone(), old.clone()));
        })));
        w.set_value(json!("42")).unwrap();
        assert_eq!(*seen.borrow(), vec![(json!(42), json!(1))]);
    }

    #[test]
    fn set_value_revalidates_and_messages_are_mapped() {
        let hints = UiHints {
            errors: Some(BTreeMap::from([("missing".to_string(), "Pflichtfeld".to_string())])),
            ..Default::default()
        };
        let mut w = input(
            InputKind::Text,
            SchemaTree::node("string").required().build(),
            json!("Bob"),
            hints,
        );
        assert!(w.displayed_error().is_clear());
        w.set_value(json!("")).unwrap();
        assert_eq!(w.error_reason(), Some("is not a string"));
        assert_eq!(w.displayed_error(), ErrorTree::message("Pflichtfeld"));
    }

    #[test]
    fn hint_regex_replaces_schema_pattern() {
        let hints = UiHints {
            regex: Some("^[0-9]{5}$".into()),
            ..Default::default()
        };
        let letters = SchemaTree::node("string").regex("^[a-z]+$").unwrap().required().build();
        let mut w = input(InputKind::Text, letters.clone(), Value::Null, hints);
        w.set_value(json!("abc")).unwrap();
        assert_eq!(w.displayed_error(), ErrorTree::message("regex"));
        w.set_value(json!("12345")).unwrap();
        assert!(w.valid());
        w.set_value(json!("")).unwrap();
        assert_eq!(w.displayed_error(), ErrorTree::message("missing"));

        let mut plain = input(InputKind::Text, letters, Value::Null, UiHints::default());
        plain.set_value(json!("12345")).unwrap();
        assert_eq!(plain.displayed_error(), ErrorTree::message("regex"));
    }

    #[test]
    fn reset_restores_original_and_clears_error() {
        let mut w = input(InputKind::Text, SchemaTree::node("string").build(), json!("orig"), UiHints::default());
        w.set_value(json!("changed")).unwrap();
        w.error("server says no".into()).unwrap();
        w.reset();
        assert_eq!(w.value(), json!("orig"));
        assert!(w.displayed_error().is_clear());
    }

    #[test]
    fn forced_error_is_shown_verbatim() {
        let mut w = input(InputKind::Text, SchemaTree::node("string").build(), Value::Null, UiHints::default());
        w.error("taken".into()).unwrap();
        assert_eq!(w.displayed_error(), ErrorTree::message("taken"));
        w.error(ErrorInput::Clear).unwrap();
        assert!(w.displayed_error().is_clear());
    }

    #[test]
    fn enter_invokes_injected_callback() {
        let mut w = input(InputKind::Text, SchemaTree::node("string").build(), Value::Null, UiHints::default());
        assert!(!w.handle_key(Key::Enter));
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        w.set_on_enter(Some(Rc::new(move || counter.set(counter.get() + 1))));
        assert!(w.handle_key(Key::Enter));
        assert!(!w.handle_key(Key::Escape));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn csv_lists_are_joined() {
        let node = SchemaTree::node("string").build();
        let mut w = input(InputKind::MultiSelectCsv, node.clone(), json!(["a", "b"]), UiHints::default());
        assert_eq!(w.value(), json!("a,b"));
        let spaced = UiHints {
            extra_space: Some(true),
            ..Default::default()
        };
        w = input(InputKind::MultiSelectCsv, node, json!(["a", "b"]), spaced);
        assert_eq!(w.value(), json!("a, b"));
    }

    #[test]
    fn bool_strings_are_parsed() {
        let w = input(InputKind::Bool, SchemaTree::node("bool").build(), json!("true"), UiHints::default());
        assert_eq!(w.value(), json!(true));
    }

    #[test]
    fn select_options_fall_back_to_schema_options() {
        let node = SchemaTree::node("string")
            .options(vec![json!("de"), json!("en")])
            .build();
        let w = input(InputKind::Select, node, Value::Null, UiHints::default());
        assert_eq!(
            w.options(),
            vec![OptionItem::new("de", "de"), OptionItem::new("en", "en")]
        );
    }

    #[test]
    fn select_follows_its_source_and_unsubscribes_on_drop() {
        let source = OptionsSource::custom(vec![OptionItem::new(1, "One")]);
        let hints = UiHints {
            options: Some(OptionsHint::Source(source.clone())),
            ..Default::default()
        };
        let w = input(InputKind::Select, SchemaTree::node("int").build(), Value::Null, hints);
        assert_eq!(w.options(), vec![OptionItem::new(1, "One")]);
        assert_eq!(source.subscriber_count(), 1);

        source.set_data(vec![OptionItem::new(2, "Two")]);
        assert_eq!(w.options(), vec![OptionItem::new(2, "Two")]);

        drop(w);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn leaves_reject_nested_paths() {
        let mut w = input(InputKind::Text, SchemaTree::node("string").build(), Value::Null, UiHints::default());
        let err = w.set_at(&["x".to_string()], json!(1)).unwrap_err();
        assert_eq!(err, FormError::NotAStructure("x".into()));
    }
}
