//! Parent synchronizer: one widget per field of a `Parent` schema node.
//!
//! Mounting resolves the field order, wires dynamic option bindings and then
//! mounts every field through the catalog. Afterwards the parent aggregates
//! the children into one widget: values are collected (or diffed in update
//! mode), errors and values are fanned out by field name, and `valid()` visits
//! every field.
//!
//! Child change events are queued and processed after the operation that
//! caused them has finished, in the order they happened. Per change the
//! options trigger runs first, then the per-field handler (whose result is
//! written into sibling fields), then the parent-wide handler.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::catalog::WidgetCatalog;
use crate::error::FormError;
use crate::error_tree::{ErrorInput, ErrorTree};
use crate::mount::{mount, MountProps};
use crate::options::{OptionTable, OptionsSource};
use crate::schema::{NodeClass, SchemaRef};
use crate::ui::{GridSpec, GridTable, OptionsHint, UiHints};
use crate::value::{differs, is_empty, key_string};
use crate::widget::{ChangeHandler, EnterHandler, Key, Mode, Widget};

/// Change cascades longer than this are cut off.
const MAX_CASCADE: usize = 256;

/// Per-field change callback. A returned map is written into sibling fields.
pub type FieldChangeHandler = Rc<dyn Fn(&Value, &Value) -> Option<Map<String, Value>>>;

/// Parent-wide change callback, called with `(field, new value)`.
pub type ParentChangeHandler = Rc<dyn Fn(&str, &Value)>;

/// Makes the options of `target` depend on the value of `trigger`.
#[derive(Debug, Clone, Default)]
pub struct OptionsBinding {
    pub target: String,
    pub trigger: String,
    /// Option lists keyed by the trigger's value.
    pub options: OptionTable,
}

impl OptionsBinding {
    pub fn new(target: impl Into<String>, trigger: impl Into<String>, options: OptionTable) -> Self {
        Self {
            target: target.into(),
            trigger: trigger.into(),
            options,
        }
    }
}

/// Props of a top-level parent.
#[derive(Clone)]
pub struct ParentProps {
    pub schema: SchemaRef,
    pub value: Value,
    pub mode: Mode,
    pub catalog: WidgetCatalog,
    /// Explicit field list; overrides every order hint.
    pub fields: Option<Vec<String>>,
    /// Overrides for the schema node's own hints.
    pub ui: Option<UiHints>,
    /// Overrides for individual fields.
    pub child_ui: HashMap<String, UiHints>,
    pub grid: Option<GridTable>,
    pub bindings: Vec<OptionsBinding>,
    pub field_handlers: HashMap<String, FieldChangeHandler>,
    pub on_change: Option<ParentChangeHandler>,
    /// In update mode, report every non-empty field instead of a diff.
    pub return_all: bool,
    pub label: Option<String>,
}

impl ParentProps {
    pub fn new(schema: SchemaRef, catalog: WidgetCatalog) -> Self {
        Self {
            schema,
            value: Value::Null,
            mode: Mode::default(),
            catalog,
            fields: None,
            ui: None,
            child_ui: HashMap::new(),
            grid: None,
            bindings: Vec::new(),
            field_handlers: HashMap::new(),
            on_change: None,
            return_all: false,
            label: None,
        }
    }

    pub fn value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn ui(mut self, hints: UiHints) -> Self {
        self.ui = Some(hints);
        self
    }

    pub fn child_ui(mut self, field: impl Into<String>, hints: UiHints) -> Self {
        self.child_ui.insert(field.into(), hints);
        self
    }

    pub fn grid(mut self, grid: GridTable) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn bind(mut self, binding: OptionsBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn on_field_change(
        mut self,
        field: impl Into<String>,
        handler: impl Fn(&Value, &Value) -> Option<Map<String, Value>> + 'static,
    ) -> Self {
        self.field_handlers.insert(field.into(), Rc::new(handler));
        self
    }

    pub fn on_change(mut self, handler: impl Fn(&str, &Value) + 'static) -> Self {
        self.on_change = Some(Rc::new(handler));
        self
    }

    pub fn return_all(mut self, return_all: bool) -> Self {
        self.return_all = return_all;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// One rendered field as reported by [`ParentWidget::layout`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutEntry {
    pub field: String,
    pub label: String,
    pub class: String,
    pub widget_type: String,
    pub grid: GridSpec,
}

#[derive(Debug, Clone)]
struct PendingChange {
    field: String,
    new: Value,
    old: Value,
}

struct Child {
    class: NodeClass,
    label: String,
    grid: GridSpec,
    widget: Box<dyn Widget>,
}

pub struct ParentWidget {
    schema: SchemaRef,
    mode: Mode,
    return_all: bool,
    label: Option<String>,
    hints: UiHints,
    original: Value,
    children: IndexMap<String, Child>,
    triggers: HashMap<String, Vec<OptionsSource>>,
    field_handlers: HashMap<String, FieldChangeHandler>,
    on_field_change: Option<ParentChangeHandler>,
    pending: Rc<RefCell<VecDeque<PendingChange>>>,
    on_change: Option<ChangeHandler>,
    on_enter: Rc<RefCell<Option<EnterHandler>>>,
    snapshot: Value,
    message: Option<String>,
}

impl ParentWidget {
    pub fn new(props: ParentProps) -> Result<Self, FormError> {
        let schema = props.schema;
        let class = schema.class()?;
        if class != NodeClass::Parent {
            return Err(FormError::UnsupportedClass(class.to_string()));
        }
        let hints = schema.ui().unwrap_or_default().merged(props.ui.as_ref());
        let order = field_order(&schema, &hints, props.fields.as_deref(), props.mode)?;
        let grid = props
            .grid
            .or_else(|| hints.grid.clone())
            .unwrap_or_default();
        let value = match props.value {
            Value::Object(map) => Value::Object(map),
            Value::Null => Value::Object(Map::new()),
            other => {
                warn!(value = %other, "parent ignores a non-object value");
                Value::Object(Map::new())
            }
        };

        let triggers = wire_bindings(&schema, &props.bindings, &value)?;

        let pending: Rc<RefCell<VecDeque<PendingChange>>> = Rc::default();
        let on_enter: Rc<RefCell<Option<EnterHandler>>> = Rc::default();
        let mut children = IndexMap::with_capacity(order.len());
        for name in order {
            let node = schema
                .get(&name)
                .ok_or_else(|| FormError::UnknownField(name.clone()))?;
            let child_class = node.class()?;
            let child_hints = props.child_ui.get(&name);
            let label = child_hints
                .and_then(|h| h.title.clone())
                .or_else(|| node.ui().and_then(|h| h.title))
                .unwrap_or_else(|| name.clone());
            let child_props = MountProps {
                catalog: props.catalog.clone(),
                mode: props.mode,
                ui: child_hints.cloned(),
                grid: grid.narrowed(&name),
                label: Some(label.clone()),
                return_all: props.return_all || props.mode == Mode::Update,
            };
            let initial = value.get(&name).cloned().unwrap_or(Value::Null);
            let mut widget = mount(&node, initial, &child_props)?;

            let queue = Rc::downgrade(&pending);
            let field = name.clone();
            widget.set_on_change(Some(Rc::new(move |new: &Value, old: &Value| {
                if let Some(queue) = queue.upgrade() {
                    queue.borrow_mut().push_back(PendingChange {
                        field: field.clone(),
                        new: new.clone(),
                        old: old.clone(),
                    });
                }
            })));
            let enter = on_enter.clone();
            widget.set_on_enter(Some(Rc::new(move || {
                let handler = enter.borrow().clone();
                if let Some(handler) = handler {
                    handler();
                }
            })));

            trace!(field = %name, class = %child_class, "field mounted");
            children.insert(
                name.clone(),
                Child {
                    class: child_class,
                    label,
                    grid: grid.cell_for(&name),
                    widget,
                },
            );
        }

        let mut parent = Self {
            schema,
            mode: props.mode,
            return_all: props.return_all,
            label: props.label,
            hints,
            original: value,
            children,
            triggers,
            field_handlers: props.field_handlers,
            on_field_change: props.on_change,
            pending,
            on_change: None,
            on_enter,
            snapshot: Value::Null,
            message: None,
        };
        parent.snapshot = parent.value();
        Ok(parent)
    }

    /// Structural factory used for nested parents.
    pub fn mount(node: &SchemaRef, value: Value, props: &MountProps) -> Result<Self, FormError> {
        let mut parent_props = ParentProps::new(node.clone(), props.catalog.clone())
            .value(value)
            .mode(props.mode)
            .grid(props.grid.clone())
            .return_all(props.return_all);
        parent_props.ui = props.ui.clone();
        parent_props.label = props.label.clone();
        Self::new(parent_props)
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn hints(&self) -> &UiHints {
        &self.hints
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref().or(self.hints.title.as_deref())
    }

    /// Rendered field names in order.
    pub fn order(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    pub fn child(&self, field: &str) -> Option<&dyn Widget> {
        self.children.get(field).map(|c| c.widget.as_ref())
    }

    pub fn child_mut(&mut self, field: &str) -> Option<&mut (dyn Widget + 'static)> {
        self.children.get_mut(field).map(|c| c.widget.as_mut())
    }

    /// Form-level message (an error not tied to a field).
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Field, widget type and grid cell of every rendered field.
    pub fn layout(&self) -> Vec<LayoutEntry> {
        self.children
            .iter()
            .map(|(field, child)| LayoutEntry {
                field: field.clone(),
                label: child.label.clone(),
                class: child.class.to_string(),
                widget_type: child.widget.widget_type().to_string(),
                grid: child.grid,
            })
            .collect()
    }

    /// Process queued child changes, then report a changed aggregate value.
    fn drain_changes(&mut self) {
        let mut steps = 0;
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(change) = next else {
                break;
            };
            steps += 1;
            if steps > MAX_CASCADE {
                warn!(field = %change.field, "change cascade cut off");
                self.pending.borrow_mut().clear();
                break;
            }
            self.dispatch(change);
        }

        let now = self.value();
        if now != self.snapshot {
            let old = std::mem::replace(&mut self.snapshot, now);
            if let Some(handler) = &self.on_change {
                handler(&self.snapshot, &old);
            }
        }
    }

    fn dispatch(&mut self, change: PendingChange) {
        if let Some(sources) = self.triggers.get(&change.field) {
            let key = key_string(&change.new);
            for source in sources {
                source.set_key(&key);
            }
        }

        if let Some(handler) = self.field_handlers.get(&change.field).cloned() {
            if let Some(derived) = handler(&change.new, &change.old) {
                for (name, value) in derived {
                    match self.children.get_mut(&name) {
                        Some(child) => {
                            if let Err(err) = child.widget.set_value(value) {
                                warn!(field = %name, %err, "derived value rejected");
                            }
                        }
                        None => debug!(field = %name, source = %change.field, "derived value for unknown field"),
                    }
                }
            }
        }

        if let Some(handler) = &self.on_field_change {
            handler(&change.field, &change.new);
        }
    }
}

/// `fields` override, then the per-mode order, then `order`, then the natural
/// key order.
fn field_order(
    schema: &SchemaRef,
    hints: &UiHints,
    fields: Option<&[String]>,
    mode: Mode,
) -> Result<Vec<String>, FormError> {
    let order = match fields.or_else(|| hints.order_for(mode)) {
        Some(explicit) => explicit.to_vec(),
        None => schema.keys(),
    };
    if let Some(unknown) = order.iter().find(|f| schema.get(f).is_none()) {
        return Err(FormError::UnknownField(unknown.clone()));
    }
    Ok(order)
}

/// Attach one hash-keyed source per binding to the target node and return
/// the sources by trigger field.
fn wire_bindings(
    schema: &SchemaRef,
    bindings: &[OptionsBinding],
    value: &Value,
) -> Result<HashMap<String, Vec<OptionsSource>>, FormError> {
    let mut triggers: HashMap<String, Vec<OptionsSource>> = HashMap::new();
    for binding in bindings {
        let invalid = || FormError::InvalidBinding {
            target: binding.target.clone(),
            trigger: binding.trigger.clone(),
        };
        let target = schema.get(&binding.target).ok_or_else(invalid)?;
        schema.get(&binding.trigger).ok_or_else(invalid)?;

        let key = key_string(value.get(&binding.trigger).unwrap_or(&Value::Null));
        let source = OptionsSource::hashed(binding.options.clone(), key);
        let mut hints = target.ui().unwrap_or_default();
        hints.options = Some(OptionsHint::Source(source.clone()));
        target.set_ui(hints);
        debug!(target = %binding.target, trigger = %binding.trigger, "options binding wired");
        triggers
            .entry(binding.trigger.clone())
            .or_default()
            .push(source);
    }
    Ok(triggers)
}

impl Widget for ParentWidget {
    fn widget_type(&self) -> &str {
        NodeClass::Parent.as_ref()
    }

    fn value(&self) -> Value {
        let diff = self.mode == Mode::Update && !self.return_all;
        let mut out = Map::new();
        for (name, child) in &self.children {
            let value = child.widget.value();
            let keep = if diff {
                differs(&value, self.original.get(name).unwrap_or(&Value::Null))
            } else {
                !is_empty(&value)
            };
            if keep {
                out.insert(name.clone(), value);
            }
        }
        Value::Object(out)
    }

    fn set_value(&mut self, value: Value) -> Result<(), FormError> {
        let result = match value {
            Value::Object(map) => map.into_iter().try_for_each(|(name, value)| {
                match self.children.get_mut(&name) {
                    Some(child) => child.widget.set_value(value),
                    None => {
                        debug!(field = %name, "ignoring value for unknown field");
                        Ok(())
                    }
                }
            }),
            Value::Null => self
                .children
                .values_mut()
                .try_for_each(|child| child.widget.set_value(Value::Null)),
            other => {
                warn!(value = %other, "parent ignores a non-object value");
                Ok(())
            }
        };
        self.drain_changes();
        result
    }

    fn valid(&mut self) -> bool {
        self.message = None;
        let mut ok = true;
        for child in self.children.values_mut() {
            ok = child.widget.valid() && ok;
        }
        ok
    }

    fn error(&mut self, errors: ErrorInput) -> Result<(), FormError> {
        match errors.into_tree() {
            ErrorTree::Clear => {
                self.message = None;
                for child in self.children.values_mut() {
                    child.widget.error(ErrorInput::Clear)?;
                }
            }
            ErrorTree::Message(m) => self.message = Some(m),
            ErrorTree::Branch(mut map) => {
                if let Some(unknown) = map.keys().find(|k| !self.children.contains_key(*k)) {
                    return Err(FormError::UnknownField(unknown.clone()));
                }
                self.message = None;
                for (name, child) in self.children.iter_mut() {
                    let sub = map.remove(name).unwrap_or_default();
                    child.widget.error(ErrorInput::Tree(sub))?;
                }
            }
        }
        Ok(())
    }

    fn displayed_error(&self) -> ErrorTree {
        if let Some(m) = &self.message {
            return ErrorTree::message(m.clone());
        }
        let branch: std::collections::BTreeMap<String, ErrorTree> = self
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.widget.displayed_error()))
            .filter(|(_, e)| !e.is_clear())
            .collect();
        if branch.is_empty() {
            ErrorTree::Clear
        } else {
            ErrorTree::Branch(branch)
        }
    }

    fn reset(&mut self) {
        self.message = None;
        for child in self.children.values_mut() {
            child.widget.reset();
        }
        self.drain_changes();
    }

    fn set_on_change(&mut self, handler: Option<ChangeHandler>) {
        self.on_change = handler;
    }

    fn set_on_enter(&mut self, handler: Option<EnterHandler>) {
        *self.on_enter.borrow_mut() = handler;
    }

    fn handle_key(&mut self, key: Key) -> bool {
        let handler = self.on_enter.borrow().clone();
        match (key, handler) {
            (Key::Enter, Some(handler)) => {
                handler();
                true
            }
            _ => false,
        }
    }

    fn set_at(&mut self, path: &[String], value: Value) -> Result<(), FormError> {
        let Some((head, rest)) = path.split_first() else {
            return self.set_value(value);
        };
        let child = self
            .children
            .get_mut(head)
            .ok_or_else(|| FormError::UnknownField(head.clone()))?;
        let result = child.widget.set_at(rest, value);
        self.drain_changes();
        result
    }

    fn handle_key_at(&mut self, path: &[String], key: Key) -> Result<bool, FormError> {
        let Some((head, rest)) = path.split_first() else {
            return Ok(self.handle_key(key));
        };
        let child = self
            .children
            .get_mut(head)
            .ok_or_else(|| FormError::UnknownField(head.clone()))?;
        child.widget.handle_key_at(rest, key)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
