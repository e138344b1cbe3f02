//! Array synchronizer.
//!
//! Elements are kept in an `IndexMap` keyed by a generated [`ElementKey`]; the
//! map order is the render order. Removing an element never touches the
//! widgets of the others. A full `set_value` regenerates every key.
//!
//! When the node hints name a plugin, that single plugin widget stands in for
//! the whole array and every operation is delegated to it.

use std::any::Any;
use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::FormError;
use crate::error_tree::{canonical_reason, ErrorInput, ErrorTree};
use crate::mount::{mount, MountProps};
use crate::schema::SchemaRef;
use crate::ui::UiHints;
use crate::widget::{ChangeHandler, EnterHandler, Key, Widget};

/// Stable identity of one array element, independent of its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKey(Uuid);

impl ElementKey {
    pub fn new() -> Self {
        ElementKey(Uuid::new_v4())
    }
}

impl Default for ElementKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub struct ArrayWidget {
    node: SchemaRef,
    child: Option<SchemaRef>,
    hints: UiHints,
    child_props: MountProps,
    plugin: Option<(String, Box<dyn Widget>)>,
    elements: IndexMap<ElementKey, Box<dyn Widget>>,
    /// Error of the array itself (item count and the like).
    message: Option<String>,
    snapshot: Value,
    on_change: Option<ChangeHandler>,
    on_enter: Option<EnterHandler>,
}

impl ArrayWidget {
    pub fn mount(node: &SchemaRef, value: Value, props: &MountProps) -> Result<Self, FormError> {
        let hints = props.hints_for(node);
        let child_props = MountProps {
            catalog: props.catalog.clone(),
            mode: props.mode,
            ui: None,
            grid: props.grid.clone(),
            label: None,
            return_all: true,
        };

        let mut widget = Self {
            node: node.clone(),
            child: node.child(),
            hints,
            child_props,
            plugin: None,
            elements: IndexMap::new(),
            message: None,
            snapshot: Value::Null,
            on_change: None,
            on_enter: None,
        };

        if let Some(name) = widget.hints.widget.clone() {
            let factory = props
                .catalog
                .structural(&name)
                .ok_or_else(|| FormError::UnknownWidget(name.clone()))?;
            let plugin_props = MountProps {
                ui: Some(widget.hints.clone()),
                ..props.clone()
            };
            let plugin = factory(node, value, &plugin_props)?;
            trace!(plugin = %name, "array delegated to plugin");
            widget.plugin = Some((name, plugin));
        } else {
            widget.replace_elements(value)?;
        }
        widget.snapshot = widget.value();
        Ok(widget)
    }

    pub fn hints(&self) -> &UiHints {
        &self.hints
    }

    /// Name of the plugin standing in for the array, if any.
    pub fn plugin_name(&self) -> Option<&str> {
        self.plugin.as_ref().map(|(name, _)| name.as_str())
    }

    /// Element keys in render order.
    pub fn keys(&self) -> Vec<ElementKey> {
        self.elements.keys().copied().collect()
    }

    pub fn element(&self, key: &ElementKey) -> Option<&dyn Widget> {
        self.elements.get(key).map(|w| w.as_ref())
    }

    pub fn element_mut(&mut self, key: &ElementKey) -> Option<&mut (dyn Widget + 'static)> {
        self.elements.get_mut(key).map(|w| w.as_mut())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Append an empty element and return its key. Nothing is validated.
    pub fn add(&mut self) -> Result<ElementKey, FormError> {
        if let Some((name, _)) = &self.plugin {
            return Err(FormError::PluginManaged(name.clone()));
        }
        let key = self.push_element(Value::Null)?;
        self.notify_change();
        Ok(key)
    }

    /// Drop the element with `key`. Returns `false` if there is none.
    pub fn remove(&mut self, key: &ElementKey) -> bool {
        let removed = self.elements.shift_remove(key).is_some();
        if removed {
            trace!(%key, "array element removed");
            self.notify_change();
        } else {
            debug!(%key, "remove of unknown array element");
        }
        removed
    }

    fn child_node(&self) -> Result<&SchemaRef, FormError> {
        self.child
            .as_ref()
            .ok_or_else(|| FormError::InvalidSchema("array node without child schema".into()))
    }

    fn mount_element(&self, value: Value) -> Result<Box<dyn Widget>, FormError> {
        let mut element = mount(self.child_node()?, value, &self.child_props)?;
        element.set_on_enter(self.on_enter.clone());
        Ok(element)
    }

    fn push_element(&mut self, value: Value) -> Result<ElementKey, FormError> {
        let element = self.mount_element(value)?;
        let key = ElementKey::new();
        self.elements.insert(key, element);
        Ok(key)
    }

    fn replace_elements(&mut self, value: Value) -> Result<(), FormError> {
        let items = match value {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => {
                warn!(value = %other, "array widget ignores a non-list value");
                return Ok(());
            }
        };
        // mounted aside so a failing element leaves the current list intact
        let mut elements = IndexMap::with_capacity(items.len());
        for item in items {
            elements.insert(ElementKey::new(), self.mount_element(item)?);
        }
        self.elements = elements;
        Ok(())
    }

    fn element_at(&mut self, segment: &str) -> Result<&mut Box<dyn Widget>, FormError> {
        let index: usize = segment
            .parse()
            .map_err(|_| FormError::UnknownField(segment.to_string()))?;
        self.elements
            .get_index_mut(index)
            .map(|(_, w)| w)
            .ok_or_else(|| FormError::UnknownField(segment.to_string()))
    }

    fn notify_change(&mut self) {
        let now = self.value();
        if now == self.snapshot {
            return;
        }
        let old = std::mem::replace(&mut self.snapshot, now);
        if let Some(handler) = &self.on_change {
            handler(&self.snapshot, &old);
        }
    }
}

impl Widget for ArrayWidget {
    fn widget_type(&self) -> &str {
        match &self.plugin {
            Some((name, _)) => name,
            None => "ArrayNode",
        }
    }

    fn value(&self) -> Value {
        match &self.plugin {
            Some((_, plugin)) => plugin.value(),
            None => Value::Array(self.elements.values().map(|w| w.value()).collect()),
        }
    }

    fn set_value(&mut self, value: Value) -> Result<(), FormError> {
        match &mut self.plugin {
            Some((_, plugin)) => plugin.set_value(value)?,
            None => {
                self.message = None;
                self.replace_elements(value)?;
            }
        }
        self.notify_change();
        Ok(())
    }

    fn valid(&mut self) -> bool {
        if let Some((name, plugin)) = &mut self.plugin {
            let outcome = match self.node.valid(&plugin.value()) {
                Ok(()) => (true, ErrorInput::Clear),
                Err(failures) => (false, ErrorInput::Failures(failures)),
            };
            if let Err(err) = plugin.error(outcome.1) {
                warn!(plugin = %name, %err, "plugin rejected validation errors");
            }
            return outcome.0;
        }

        let mut ok = true;
        for element in self.elements.values_mut() {
            ok = element.valid() && ok;
        }
        self.message = match self.node.valid(&self.value()) {
            Ok(()) => None,
            Err(failures) => failures
                .into_iter()
                .find(|f| f.path.is_empty())
                .map(|f| canonical_reason(&f.reason).to_string()),
        };
        ok && self.message.is_none()
    }

    fn error(&mut self, errors: ErrorInput) -> Result<(), FormError> {
        if let Some((_, plugin)) = &mut self.plugin {
            return plugin.error(errors);
        }
        match errors.into_tree() {
            ErrorTree::Clear => {
                self.message = None;
                for element in self.elements.values_mut() {
                    element.error(ErrorInput::Clear)?;
                }
            }
            ErrorTree::Message(m) => self.message = Some(m),
            ErrorTree::Branch(mut map) => {
                let mut routed = Vec::with_capacity(map.len());
                for segment in map.keys() {
                    let index: usize = segment
                        .parse()
                        .map_err(|_| FormError::UnknownField(segment.clone()))?;
                    if index < self.elements.len() {
                        routed.push((index, segment.clone()));
                    } else {
                        warn!(index, len = self.elements.len(), "error for missing array element");
                    }
                }
                self.message = None;
                for (index, element) in self.elements.values_mut().enumerate() {
                    let sub = routed
                        .iter()
                        .find(|(i, _)| *i == index)
                        .and_then(|(_, segment)| map.remove(segment))
                        .unwrap_or_default();
                    element.error(ErrorInput::Tree(sub))?;
                }
            }
        }
        Ok(())
    }

    fn displayed_error(&self) -> ErrorTree {
        if let Some((_, plugin)) = &self.plugin {
            return plugin.displayed_error();
        }
        if let Some(m) = &self.message {
            return ErrorTree::message(self.hints.message_for(m));
        }
        let branch: std::collections::BTreeMap<String, ErrorTree> = self
            .elements
            .values()
            .enumerate()
            .map(|(i, w)| (i.to_string(), w.displayed_error()))
            .filter(|(_, e)| !e.is_clear())
            .collect();
        if branch.is_empty() {
            ErrorTree::Clear
        } else {
            ErrorTree::Branch(branch)
        }
    }

    fn reset(&mut self) {
        match &mut self.plugin {
            Some((_, plugin)) => plugin.reset(),
            None => {
                self.message = None;
                for element in self.elements.values_mut() {
                    element.reset();
                }
            }
        }
        self.notify_change();
    }

    fn set_on_change(&mut self, handler: Option<ChangeHandler>) {
        match &mut self.plugin {
            Some((_, plugin)) => plugin.set_on_change(handler),
            None => self.on_change = handler,
        }
    }

    fn set_on_enter(&mut self, handler: Option<EnterHandler>) {
        if let Some((_, plugin)) = &mut self.plugin {
            plugin.set_on_enter(handler.clone());
        }
        for element in self.elements.values_mut() {
            element.set_on_enter(handler.clone());
        }
        self.on_enter = handler;
    }

    fn handle_key(&mut self, key: Key) -> bool {
        match (&mut self.plugin, key, &self.on_enter) {
            (Some((_, plugin)), _, _) => plugin.handle_key(key),
            (None, Key::Enter, Some(handler)) => {
                handler();
                true
            }
            _ => false,
        }
    }

    fn set_at(&mut self, path: &[String], value: Value) -> Result<(), FormError> {
        if let Some((_, plugin)) = &mut self.plugin {
            plugin.set_at(path, value)?;
            self.notify_change();
            return Ok(());
        }
        let Some((head, rest)) = path.split_first() else {
            return self.set_value(value);
        };
        self.element_at(head)?.set_at(rest, value)?;
        self.notify_change();
        Ok(())
    }

    fn handle_key_at(&mut self, path: &[String], key: Key) -> Result<bool, FormError> {
        if let Some((_, plugin)) = &mut self.plugin {
            return plugin.handle_key_at(path, key);
        }
        match path.split_first() {
            None => Ok(self.handle_key(key)),
            Some((head, rest)) => self.element_at(head)?.handle_key_at(rest, key),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
