//! The common widget contract.
//!
//! Every mounted widget, leaf or structural, implements [`Widget`]. Enclosing
//! synchronizers only ever talk to their children through this trait, which
//! keeps them agnostic of the concrete widget set.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::error::FormError;
use crate::error_tree::{ErrorInput, ErrorTree};

/// What the form is used for.
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
pub enum Mode {
    #[default]
    Create,
    /// Values are emitted as a diff against the original value.
    Update,
    /// Leaves get operator pickers; empty values are valid.
    Search,
}

/// Key events widgets react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Other(char),
}

/// Change listener, called with `(new, old)` after the change is committed.
pub type ChangeHandler = Rc<dyn Fn(&Value, &Value)>;

/// Called when Enter is pressed inside a widget.
pub type EnterHandler = Rc<dyn Fn()>;

/// A mounted widget bound to one schema position.
pub trait Widget {
    /// Registered type name (`"text"`, `"select"`, `"Parent"`, a plugin name).
    fn widget_type(&self) -> &str;

    /// Current value (sub)tree.
    fn value(&self) -> Value;

    /// Write `value` and re-derive the local error state.
    fn set_value(&mut self, value: Value) -> Result<(), FormError>;

    /// Validate the current value and display the resulting errors.
    fn valid(&mut self) -> bool;

    /// Force-display `errors` without revalidating.
    fn error(&mut self, errors: ErrorInput) -> Result<(), FormError>;

    /// Error state as currently displayed (messages already mapped through
    /// the `errors` hint).
    fn displayed_error(&self) -> ErrorTree;

    /// Restore the original value and clear errors.
    fn reset(&mut self);

    fn set_on_change(&mut self, handler: Option<ChangeHandler>);

    fn set_on_enter(&mut self, handler: Option<EnterHandler>);

    /// Returns `true` if the key was consumed.
    fn handle_key(&mut self, key: Key) -> bool;

    /// Write `value` at a relative path. Leaves only accept the empty path.
    fn set_at(&mut self, path: &[String], value: Value) -> Result<(), FormError> {
        if path.is_empty() {
            self.set_value(value)
        } else {
            Err(FormError::NotAStructure(path.join(".")))
        }
    }

    /// Deliver `key` to the widget at a relative path.
    fn handle_key_at(&mut self, path: &[String], key: Key) -> Result<bool, FormError> {
        if path.is_empty() {
            Ok(self.handle_key(key))
        } else {
            Err(FormError::NotAStructure(path.join(".")))
        }
    }

    /// Convert to `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl fmt::Debug for dyn Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Widget({})", self.widget_type())
    }
}

/// Downcast a widget reference.
pub fn downcast_ref<T: Widget + 'static>(widget: &dyn Widget) -> Option<&T> {
    widget.as_any().downcast_ref::<T>()
}

pub fn downcast_mut<T: Widget + 'static>(widget: &mut dyn Widget) -> Option<&mut T> {
    widget.as_any_mut().downcast_mut::<T>()
}
