//! Widget catalog: type name to constructor.
//!
//! Two independent tables exist. Leaf plugins (`"text"`, `"select"`, ...)
//! are looked up by the node resolver; structural factories are looked up by
//! class name (`"Node"`, `"ArrayNode"`, `"HashNode"`, `"Parent"`) and by the
//! plugin names array and hash nodes name in their hints.
//!
//! Registration overwrites: registering a name twice keeps the second binding.
//!
//! Synchronizers receive their catalog explicitly. [`WidgetCatalog::shared`]
//! is a per-thread default with the built-in widgets for callers that do not
//! need isolation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::array::ArrayWidget;
use crate::error::FormError;
use crate::hash::HashWidget;
use crate::leaf;
use crate::mount::MountProps;
use crate::parent::ParentWidget;
use crate::resolver::NodeWidget;
use crate::schema::{NodeClass, SchemaRef};
use crate::ui::UiHints;
use crate::widget::{Mode, Widget};

/// Everything a leaf constructor receives.
#[derive(Debug, Clone)]
pub struct LeafProps {
    /// Name the widget was resolved under.
    pub widget_type: String,
    pub node: SchemaRef,
    /// Initial value; defaults are already applied.
    pub value: Value,
    /// Node hints merged with the enclosing overrides.
    pub hints: UiHints,
    pub mode: Mode,
    pub label: Option<String>,
}

pub type LeafFactory = Rc<dyn Fn(LeafProps) -> Result<Box<dyn Widget>, FormError>>;

pub type StructuralFactory =
    Rc<dyn Fn(&SchemaRef, Value, &MountProps) -> Result<Box<dyn Widget>, FormError>>;

#[derive(Clone)]
struct LeafEntry {
    factory: LeafFactory,
    default: Option<Value>,
}

#[derive(Default)]
struct CatalogInner {
    leaves: HashMap<String, LeafEntry>,
    structural: HashMap<String, StructuralFactory>,
}

/// Shared handle to a widget registry.
#[derive(Clone, Default)]
pub struct WidgetCatalog {
    inner: Rc<RefCell<CatalogInner>>,
}

thread_local! {
    static SHARED: WidgetCatalog = WidgetCatalog::with_builtins();
}

impl WidgetCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in leaf widgets and structural synchronizers.
    pub fn with_builtins() -> Self {
        let catalog = Self::new();
        leaf::register_builtins(&catalog);
        catalog.register_structural(
            NodeClass::Node.as_ref(),
            Rc::new(|node, value, props| Ok(Box::new(NodeWidget::mount(node, value, props)?))),
        );
        catalog.register_structural(
            NodeClass::ArrayNode.as_ref(),
            Rc::new(|node, value, props| Ok(Box::new(ArrayWidget::mount(node, value, props)?))),
        );
        catalog.register_structural(
            NodeClass::HashNode.as_ref(),
            Rc::new(|node, value, props| Ok(Box::new(HashWidget::mount(node, value, props)?))),
        );
        catalog.register_structural(
            NodeClass::Parent.as_ref(),
            Rc::new(|node, value, props| Ok(Box::new(ParentWidget::mount(node, value, props)?))),
        );
        catalog
    }

    /// Per-thread default catalog.
    pub fn shared() -> Self {
        SHARED.with(Clone::clone)
    }

    pub fn ptr_eq(&self, other: &WidgetCatalog) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register a leaf plugin with an optional default value.
    pub fn register_leaf(
        &self,
        name: impl Into<String>,
        factory: LeafFactory,
        default: Option<Value>,
    ) {
        let name = name.into();
        let replaced = self
            .inner
            .borrow_mut()
            .leaves
            .insert(name.clone(), LeafEntry { factory, default })
            .is_some();
        debug!(name, replaced, "leaf widget registered");
    }

    /// Register a structural widget or plugin.
    pub fn register_structural(&self, name: impl Into<String>, factory: StructuralFactory) {
        let name = name.into();
        let replaced = self
            .inner
            .borrow_mut()
            .structural
            .insert(name.clone(), factory)
            .is_some();
        debug!(name, replaced, "structural widget registered");
    }

    pub fn has_leaf(&self, name: &str) -> bool {
        self.inner.borrow().leaves.contains_key(name)
    }

    pub fn leaf_default(&self, name: &str) -> Option<Value> {
        self.inner
            .borrow()
            .leaves
            .get(name)
            .and_then(|e| e.default.clone())
    }

    pub fn structural(&self, name: &str) -> Option<StructuralFactory> {
        self.inner.borrow().structural.get(name).cloned()
    }

    /// Sorted names of all registered leaf widgets.
    pub fn leaf_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.borrow().leaves.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct the leaf registered as `props.widget_type`.
    ///
    /// A null initial value is replaced by the hint default or, failing that,
    /// the registered default. Update mode never applies defaults.
    pub fn mount_leaf(&self, mut props: LeafProps) -> Result<Box<dyn Widget>, FormError> {
        // Factories may use the catalog themselves; release the borrow first.
        let entry = self
            .inner
            .borrow()
            .leaves
            .get(&props.widget_type)
            .cloned()
            .ok_or_else(|| FormError::UnknownWidget(props.widget_type.clone()))?;

        if props.value.is_null() && props.mode != Mode::Update {
            if let Some(default) = props.hints.default.clone().or(entry.default) {
                props.value = default;
            }
        }
        (entry.factory)(props)
    }
}

impl fmt::Debug for WidgetCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let mut structural: Vec<&String> = inner.structural.keys().collect();
        structural.sort();
        f.debug_struct("WidgetCatalog")
            .field("leaves", &self.leaf_names())
            .field("structural", &structural)
            .finish()
    }
}
