//! Free-form object synchronizer.
//!
//! There is no generic rendering for a `HashNode`: the node hints must name a
//! registered structural plugin, and everything is delegated to it.

use std::any::Any;

use serde_json::Value;
use tracing::trace;

use crate::error::FormError;
use crate::error_tree::{ErrorInput, ErrorTree};
use crate::mount::MountProps;
use crate::schema::{NodeClass, SchemaRef};
use crate::ui::UiHints;
use crate::widget::{ChangeHandler, EnterHandler, Key, Widget};

pub struct HashWidget {
    plugin_name: String,
    hints: UiHints,
    plugin: Box<dyn Widget>,
}

impl HashWidget {
    pub fn mount(node: &SchemaRef, value: Value, props: &MountProps) -> Result<Self, FormError> {
        let hints = props.hints_for(node);
        let missing = || FormError::MissingPlugin(props.label.clone().unwrap_or_else(|| "HashNode".into()));
        let name = hints.widget.clone().ok_or_else(missing)?;
        // A class name would mount this synchronizer again.
        if name.parse::<NodeClass>().is_ok() {
            return Err(missing());
        }
        let factory = props
            .catalog
            .structural(&name)
            .ok_or_else(|| FormError::UnknownWidget(name.clone()))?;
        let plugin_props = MountProps {
            ui: Some(hints.clone()),
            ..props.clone()
        };
        let plugin = factory(node, value, &plugin_props)?;
        trace!(plugin = %name, "hash node mounted");
        Ok(Self {
            plugin_name: name,
            hints,
            plugin,
        })
    }

    pub fn hints(&self) -> &UiHints {
        &self.hints
    }

    pub fn plugin(&self) -> &dyn Widget {
        self.plugin.as_ref()
    }
}

impl Widget for HashWidget {
    fn widget_type(&self) -> &str {
        &self.plugin_name
    }

    fn value(&self) -> Value {
        self.plugin.value()
    }

    fn set_value(&mut self, value: Value) -> Result<(), FormError> {
        self.plugin.set_value(value)
    }

    fn valid(&mut self) -> bool {
        self.plugin.valid()
    }

    fn error(&mut self, errors: ErrorInput) -> Result<(), FormError> {
        self.plugin.error(errors)
    }

    fn displayed_error(&self) -> ErrorTree {
        self.plugin.displayed_error()
    }

    fn reset(&mut self) {
        self.plugin.reset()
    }

    fn set_on_change(&mut self, handler: Option<ChangeHandler>) {
        self.plugin.set_on_change(handler)
    }

    fn set_on_enter(&mut self, handler: Option<EnterHandler>) {
        self.plugin.set_on_enter(handler)
    }

    fn handle_key(&mut self, key: Key) -> bool {
        self.plugin.handle_key(key)
    }

    fn set_at(&mut self, path: &[String], value: Value) -> Result<(), FormError> {
        self.plugin.set_at(path, value)
    }

    fn handle_key_at(&mut self, path: &[String], key: Key) -> Result<bool, FormError> {
        self.plugin.handle_key_at(path, key)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
