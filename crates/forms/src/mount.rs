//! Class dispatch: mount the widget matching a schema node's class.

use serde_json::Value;
use tracing::trace;

use crate::catalog::WidgetCatalog;
use crate::error::FormError;
use crate::schema::SchemaRef;
use crate::ui::{GridTable, UiHints};
use crate::widget::{Mode, Widget};

/// Props forwarded from an enclosing synchronizer to a child.
#[derive(Debug, Clone, Default)]
pub struct MountProps {
    pub catalog: WidgetCatalog,
    pub mode: Mode,
    /// Hint overrides applied on top of the node's own hints.
    pub ui: Option<UiHints>,
    /// Grid table narrowed to the child.
    pub grid: GridTable,
    pub label: Option<String>,
    /// Structural children report every non-empty field instead of a diff.
    pub return_all: bool,
}

impl MountProps {
    pub fn new(catalog: WidgetCatalog, mode: Mode) -> Self {
        Self {
            catalog,
            mode,
            ..Default::default()
        }
    }

    /// The node's hints with this mount's overrides applied.
    pub fn hints_for(&self, node: &SchemaRef) -> UiHints {
        node.ui().unwrap_or_default().merged(self.ui.as_ref())
    }
}

/// Mount `node` with the structural factory registered for its class.
pub fn mount(
    node: &SchemaRef,
    value: Value,
    props: &MountProps,
) -> Result<Box<dyn Widget>, FormError> {
    let class = node.class()?;
    let factory = props
        .catalog
        .structural(class.as_ref())
        .ok_or_else(|| FormError::UnsupportedClass(class.to_string()))?;
    trace!(%class, label = props.label.as_deref(), "mounting widget");
    factory(node, value, props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MinMax, SchemaNode, SchemaTree, ValidationFailure};
    use serde_json::json;
    use std::rc::Rc;

    struct Tuple;

    impl SchemaNode for Tuple {
        fn class_name(&self) -> &str {
            "Tuple"
        }
        fn type_name(&self) -> Option<&str> {
            None
        }
        fn options(&self) -> Option<Vec<Value>> {
            None
        }
        fn minmax(&self) -> MinMax {
            MinMax::default()
        }
        fn ui(&self) -> Option<UiHints> {
            None
        }
        fn set_ui(&self, _hints: UiHints) {}
        fn valid(&self, _value: &Value) -> Result<(), Vec<ValidationFailure>> {
            Ok(())
        }
        fn get(&self, _field: &str) -> Option<SchemaRef> {
            None
        }
        fn keys(&self) -> Vec<String> {
            vec![]
        }
        fn child(&self) -> Option<SchemaRef> {
            None
        }
    }

    #[test]
    fn dispatches_by_class() {
        let props = MountProps::new(WidgetCatalog::with_builtins(), Mode::Create);
        let leaf = mount(&SchemaTree::node("int").build(), json!(3), &props).unwrap();
        assert_eq!(leaf.widget_type(), "number");

        let list = SchemaTree::array(SchemaTree::node("string").build()).build();
        assert_eq!(mount(&list, json!(["a"]), &props).unwrap().widget_type(), "ArrayNode");
    }

    #[test]
    fn unknown_class_is_fatal() {
        let props = MountProps::new(WidgetCatalog::with_builtins(), Mode::Create);
        let node: SchemaRef = Rc::new(Tuple);
        let err = mount(&node, Value::Null, &props).unwrap_err();
        assert_eq!(err, FormError::UnsupportedClass("Tuple".into()));
    }

    #[test]
    fn empty_catalog_has_no_structural_widgets() {
        let props = MountProps::new(WidgetCatalog::new(), Mode::Create);
        let err = mount(&SchemaTree::node("int").build(), Value::Null, &props).unwrap_err();
        assert_eq!(err, FormError::UnsupportedClass("Node".into()));
    }
}
