//! The schema contract consumed by the engine.
//!
//! The schema library is the authority for node types, constraints and
//! validity. The engine only reads it through [`SchemaNode`]; the single
//! write it performs is replacing a node's UI hints (to attach a dynamic
//! options source).
//!
//! [`SchemaTree`] is the reference authority shipped with this crate. Any
//! other implementation of the trait works the same way.

mod spec;
mod tree;

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::error::FormError;
use crate::ui::UiHints;

pub use spec::SchemaSpec;
pub use tree::{SchemaBuilder, SchemaTree};

/// Shared handle to a schema node.
pub type SchemaRef = Rc<dyn SchemaNode>;

/// Class tag of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum NodeClass {
    /// Primitive leaf.
    Node,
    /// Homogeneous list with one element schema.
    ArrayNode,
    /// Free-form object.
    HashNode,
    /// Named, ordered group of child nodes.
    Parent,
}

impl NodeClass {
    pub fn is_structural(self) -> bool {
        !matches!(self, NodeClass::Node)
    }
}

/// Numeric bounds. For strings they bound the length, for arrays the number
/// of items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

/// One failed check reported by [`SchemaNode::valid`]. `path` is dotted and
/// relative to the validated node; the empty path is the node itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub path: String,
    pub reason: String,
}

impl ValidationFailure {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Read-mostly view of one node of an external schema.
pub trait SchemaNode {
    /// Raw class tag (`"Node"`, `"ArrayNode"`, `"HashNode"`, `"Parent"`).
    fn class_name(&self) -> &str;

    /// Parsed class tag. Unknown tags are a configuration error.
    fn class(&self) -> Result<NodeClass, FormError> {
        self.class_name()
            .parse()
            .map_err(|_| FormError::UnsupportedClass(self.class_name().to_string()))
    }

    /// Primitive type name; `None` for structural nodes.
    fn type_name(&self) -> Option<&str>;

    /// Enumerated allowed raw values.
    fn options(&self) -> Option<Vec<Value>>;

    fn minmax(&self) -> MinMax;

    /// The `ui` side channel.
    fn ui(&self) -> Option<UiHints>;

    /// Replace the `ui` side channel.
    fn set_ui(&self, hints: UiHints);

    /// Check `value`; on failure return every failure in report order.
    fn valid(&self, value: &Value) -> Result<(), Vec<ValidationFailure>>;

    /// Child of a `Parent`.
    fn get(&self, field: &str) -> Option<SchemaRef>;

    /// Natural field order of a `Parent`.
    fn keys(&self) -> Vec<String>;

    /// Element schema of an `ArrayNode`.
    fn child(&self) -> Option<SchemaRef>;
}

impl std::fmt::Debug for dyn SchemaNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SchemaNode({}{})",
            self.class_name(),
            self.type_name().map(|t| format!(":{t}")).unwrap_or_default()
        )
    }
}
