//! Integration tests for the synchronizers:
//! - value round trips and update diffs through nested parents
//! - array element identity across add/remove/replace
//! - non short-circuiting validation and error routing
//! - search-mode operator values

use std::rc::Rc;

use forms::widget::{downcast_mut, downcast_ref};
use forms::{
    ArrayWidget, ErrorInput, ErrorTree, FormError, Mode, MountProps, NodeWidget, Operator,
    ParentProps, ParentWidget, SchemaRef, SchemaSpec, SchemaTree, ValidationFailure, Widget,
    WidgetCatalog,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn person() -> SchemaRef {
    SchemaTree::parent()
        .field("name", SchemaTree::node("string").required().build())
        .field("age", SchemaTree::node("number").build())
        .field(
            "tags",
            SchemaTree::array(SchemaTree::node("string").build()).build(),
        )
        .field(
            "address",
            SchemaTree::parent()
                .field("city", SchemaTree::node("string").build())
                .field("zip", SchemaTree::node("string").regex("^[0-9]{5}$").unwrap().build())
                .build(),
        )
        .build()
}

fn mount_person(mode: Mode, value: Value) -> ParentWidget {
    ParentWidget::new(
        ParentProps::new(person(), WidgetCatalog::with_builtins())
            .mode(mode)
            .value(value),
    )
    .unwrap()
}

fn widget_addr(widget: &dyn Widget) -> *const () {
    widget as *const dyn Widget as *const ()
}

#[test]
fn round_trip_yields_non_empty_subset() {
    let v = json!({
        "name": "Ann",
        "age": null,
        "tags": ["a", "b"],
        "address": {"city": "Kiel", "zip": ""}
    });
    for mode in [Mode::Create, Mode::Search] {
        let mut parent = mount_person(mode, Value::Null);
        parent.set_value(v.clone()).unwrap();
        parent.reset();
        parent.set_value(v.clone()).unwrap();
        assert_eq!(
            parent.value(),
            json!({"name": "Ann", "tags": ["a", "b"], "address": {"city": "Kiel"}}),
            "mode {mode}"
        );
    }
}

#[test]
fn update_mode_reports_only_changed_fields() {
    let original = json!({
        "name": "Ann",
        "age": 30,
        "tags": ["a"],
        "address": {"city": "Kiel", "zip": "24103"}
    });
    let mut parent = mount_person(Mode::Update, original.clone());
    assert_eq!(parent.value(), json!({}));

    let mut modified = original.clone();
    modified["age"] = json!(31);
    parent.set_value(modified).unwrap();
    assert_eq!(parent.value(), json!({"age": 31}));

    parent.set_at(&["address".into(), "city".into()], json!("Bonn")).unwrap();
    assert_eq!(
        parent.value(),
        json!({"age": 31, "address": {"city": "Bonn", "zip": "24103"}})
    );

    parent.set_at(&["name".into()], json!("")).unwrap();
    assert_eq!(parent.value()["name"], Value::Null);
}

#[test]
fn return_all_disables_the_diff() {
    let original = json!({"name": "Ann", "age": 30});
    let parent = ParentWidget::new(
        ParentProps::new(person(), WidgetCatalog::with_builtins())
            .mode(Mode::Update)
            .value(original.clone())
            .return_all(true),
    )
    .unwrap();
    assert_eq!(parent.value(), original);
}

#[test]
fn array_remove_keeps_other_widgets() {
    let node = SchemaTree::array(SchemaTree::node("string").build()).build();
    let props = MountProps::new(WidgetCatalog::with_builtins(), Mode::Create);
    let mut list = ArrayWidget::mount(&node, json!(["x", "y", "z"]), &props).unwrap();

    let keys = list.keys();
    let (k1, k2, k3) = (keys[0], keys[1], keys[2]);
    let before = (
        widget_addr(list.element(&k1).unwrap()),
        widget_addr(list.element(&k3).unwrap()),
    );

    assert!(list.remove(&k2));
    assert_eq!(list.keys(), vec![k1, k3]);
    assert_eq!(list.value(), json!(["x", "z"]));
    let after = (
        widget_addr(list.element(&k1).unwrap()),
        widget_addr(list.element(&k3).unwrap()),
    );
    assert_eq!(before, after);

    let k4 = list.add().unwrap();
    assert!(![k1, k2, k3].contains(&k4));
    assert_eq!(list.keys(), vec![k1, k3, k4]);
}

#[test]
fn array_full_replace_regenerates_keys() {
    let node = SchemaTree::array(SchemaTree::node("string").build()).build();
    let props = MountProps::new(WidgetCatalog::with_builtins(), Mode::Create);
    let mut list = ArrayWidget::mount(&node, json!(["x", "y"]), &props).unwrap();
    let old = list.keys();

    list.set_value(json!(["x", "y"])).unwrap();
    assert_eq!(list.value(), json!(["x", "y"]));
    assert!(list.keys().iter().all(|k| !old.contains(k)));
}

#[test]
fn array_of_parents_routes_nested_errors() {
    let schema = SchemaTree::parent()
        .field(
            "contacts",
            SchemaTree::array(
                SchemaTree::parent()
                    .field("mail", SchemaTree::node("email").required().build())
                    .build(),
            )
            .build(),
        )
        .build();
    let mut parent = ParentWidget::new(
        ParentProps::new(schema, WidgetCatalog::with_builtins())
            .value(json!({"contacts": [{"mail": "a@b.c"}, {"mail": ""}]})),
    )
    .unwrap();

    assert!(!parent.valid());
    assert_eq!(
        parent.displayed_error().to_json(),
        json!({"contacts": {"1": {"mail": "missing"}}})
    );

    parent
        .error(ErrorInput::Failures(vec![ValidationFailure::new(
            "contacts.0.mail",
            "bounced",
        )]))
        .unwrap();
    assert_eq!(
        parent.displayed_error().at("contacts.0.mail"),
        Some(&ErrorTree::message("bounced"))
    );
    assert!(parent.displayed_error().at("contacts.1").is_none());
}

#[test]
fn valid_reports_every_invalid_sibling() {
    let schema = SchemaTree::parent()
        .field("first", SchemaTree::node("string").required().build())
        .field("last", SchemaTree::node("string").required().build())
        .field("nick", SchemaTree::node("string").build())
        .build();
    let mut parent =
        ParentWidget::new(ParentProps::new(schema, WidgetCatalog::with_builtins())).unwrap();
    assert!(!parent.valid());
    assert_eq!(
        parent.displayed_error().to_json(),
        json!({"first": "missing", "last": "missing"})
    );
}

#[test]
fn end_to_end_scenario() {
    let schema = SchemaTree::parent()
        .field("name", SchemaTree::node("text").required().build())
        .field("age", SchemaTree::node("number").build())
        .field(
            "tags",
            SchemaTree::array(SchemaTree::node("text").build()).build(),
        )
        .build();
    let mut parent =
        ParentWidget::new(ParentProps::new(schema, WidgetCatalog::with_builtins())).unwrap();

    parent
        .set_value(json!({"name": "", "age": 5, "tags": ["a", "b"]}))
        .unwrap();
    assert!(!parent.valid());
    let errors = parent.displayed_error();
    assert_eq!(errors.at("name"), Some(&ErrorTree::message("missing")));
    assert!(errors.at("age").is_none());
    assert!(errors.at("tags").is_none());

    parent.set_at(&["name".into()], json!("Bob")).unwrap();
    assert!(parent.valid());
    assert!(parent.displayed_error().is_clear());
    assert_eq!(
        parent.value(),
        json!({"name": "Bob", "age": 5, "tags": ["a", "b"]})
    );
}

#[test]
fn search_mode_tagged_value_round_trip() {
    let mut parent = mount_person(Mode::Search, Value::Null);
    {
        let age = downcast_mut::<NodeWidget>(parent.child_mut("age").unwrap()).unwrap();
        assert!(age.set_operator(Operator::Greater));
        age.leaf_mut().set_value(json!(10)).unwrap();
    }
    let read = parent.value();
    assert_eq!(read, json!({"age": {"type": "greater", "value": 10}}));

    let mut other = mount_person(Mode::Search, Value::Null);
    other.set_value(read).unwrap();
    let age = downcast_ref::<NodeWidget>(other.child("age").unwrap()).unwrap();
    assert_eq!(age.operator(), Operator::Greater);
    assert_eq!(age.leaf().value(), json!(10));
}

#[test]
fn operator_switch_reaches_parent_listener() {
    let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = seen.clone();
    let mut parent = ParentWidget::new(
        ParentProps::new(person(), WidgetCatalog::with_builtins())
            .mode(Mode::Search)
            .value(json!({"age": 10}))
            .on_change(move |field, value| sink.borrow_mut().push((field.to_string(), value.clone()))),
    )
    .unwrap();
    parent
        .set_at(&["age".into()], json!({"type": "greater", "value": 10}))
        .unwrap();
    parent.set_at(&["age".into()], json!(10)).unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![
            ("age".to_string(), json!({"type": "greater", "value": 10})),
            ("age".to_string(), json!(10)),
        ]
    );
}

#[test]
fn error_routing_rejects_unknown_fields() {
    let mut parent = mount_person(Mode::Create, Value::Null);
    let err = parent
        .error(ErrorInput::Failures(vec![ValidationFailure::new("email", "bad")]))
        .unwrap_err();
    assert_eq!(err, FormError::UnknownField("email".into()));

    parent
        .error(ErrorTree::from_json(&json!({"address": {"zip": "regex"}})).into())
        .unwrap();
    assert_eq!(
        parent.displayed_error().to_json(),
        json!({"address": {"zip": "regex"}})
    );
}

#[test]
fn nested_change_bubbles_to_parent_listener() {
    let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = seen.clone();
    let mut parent = ParentWidget::new(
        ParentProps::new(person(), WidgetCatalog::with_builtins())
            .on_change(move |field, value| sink.borrow_mut().push((field.to_string(), value.clone()))),
    )
    .unwrap();
    parent.set_at(&["address".into(), "city".into()], json!("Kiel")).unwrap();
    parent.set_at(&["tags".into()], json!(["t"])).unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![
            ("address".to_string(), json!({"city": "Kiel"})),
            ("tags".to_string(), json!(["t"])),
        ]
    );
}

#[test]
fn schema_description_drives_a_form() {
    let schema = SchemaSpec::from_json(json!({
        "class": "Parent",
        "ui": {"order": ["lang", "title"], "grid": {"__default__": {"xs": 12, "md": 6}}},
        "fields": {
            "title": {"class": "Node", "type": "string", "required": true, "ui": {"title": "Titel"}},
            "lang": {"class": "Node", "type": "string", "options": ["de", "en"]},
            "body": {"class": "Node", "type": "text", "ui": {"widget": "textarea"}}
        }
    }))
    .and_then(SchemaSpec::build)
    .unwrap();
    let parent =
        ParentWidget::new(ParentProps::new(schema, WidgetCatalog::with_builtins())).unwrap();

    let layout = parent.layout();
    let summary: Vec<(&str, &str, &str)> = layout
        .iter()
        .map(|e| (e.field.as_str(), e.label.as_str(), e.widget_type.as_str()))
        .collect();
    assert_eq!(summary, vec![("lang", "lang", "select"), ("title", "Titel", "text")]);
    assert_eq!(layout[0].grid.md, Some(6));
}
