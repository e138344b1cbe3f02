//! Schema-driven form engine.
//!
//! Given a schema tree (see [`schema`]), the engine mounts one widget per
//! schema position, keeps values and errors in sync between the widget tree
//! and plain value trees, and validates through the schema authority.
//!
//! ```
//! use forms::{Form, ParentProps, SchemaTree, SubmitStatus, WidgetCatalog};
//! use serde_json::json;
//!
//! let schema = SchemaTree::parent()
//!     .field("name", SchemaTree::node("string").required().build())
//!     .field("age", SchemaTree::node("int").build())
//!     .build();
//! let props = ParentProps::new(schema, WidgetCatalog::shared()).value(json!({"age": 5}));
//! let mut form = Form::new(props, |value| {
//!     println!("{value}");
//!     true.into()
//! })?;
//!
//! let status = futures::executor::block_on(form.submit())?;
//! assert_eq!(status, SubmitStatus::Invalid);
//! assert_eq!(form.errors().to_json(), json!({"name": "missing"}));
//!
//! form.set_at("name", json!("Bob"))?;
//! let status = futures::executor::block_on(form.submit())?;
//! assert_eq!(status, SubmitStatus::Accepted);
//! assert_eq!(form.value(), json!({"name": "Bob", "age": 5}));
//! # Ok::<(), forms::FormError>(())
//! ```
//!
//! Widgets are headless: they hold state, a renderer draws them.

pub mod array;
pub mod catalog;
pub mod error;
pub mod error_tree;
pub mod form;
pub mod hash;
pub mod leaf;
pub mod mount;
pub mod options;
pub mod parent;
pub mod path;
pub mod resolver;
pub mod schema;
pub mod ui;
pub mod value;
pub mod widget;

pub use array::{ArrayWidget, ElementKey};
pub use catalog::{LeafFactory, LeafProps, StructuralFactory, WidgetCatalog};
pub use error::{FetchError, FormError};
pub use error_tree::{canonical_reason, reshape_errors, ErrorInput, ErrorTree};
pub use form::{Form, Search, SubmitHandler, SubmitOutcome, SubmitReply, SubmitStatus};
pub use hash::HashWidget;
pub use leaf::{InputKind, InputWidget};
pub use mount::{mount, MountProps};
pub use options::{FieldExtractor, OptionItem, OptionTable, OptionsSource, Subscriber};
pub use parent::{
    FieldChangeHandler, LayoutEntry, OptionsBinding, ParentChangeHandler, ParentProps,
    ParentWidget,
};
pub use path::FieldPath;
pub use resolver::{operators_for, resolve_widget_type, NodeWidget, Operator, OperatorPicker};
pub use schema::{
    MinMax, NodeClass, SchemaBuilder, SchemaNode, SchemaRef, SchemaSpec, SchemaTree,
    ValidationFailure,
};
pub use ui::{GridEntry, GridSpec, GridTable, OptionsHint, UiHints};
pub use widget::{ChangeHandler, EnterHandler, Key, Mode, Widget};
