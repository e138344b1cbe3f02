use std::any::Any;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use forms::{
    ChangeHandler, EnterHandler, ErrorInput, ErrorTree, FieldPath, FormError, Key, LayoutEntry, Mode,
    ParentProps, ParentWidget, SchemaRef, SchemaSpec, Widget, WidgetCatalog,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::cli::Cmd;
use crate::config::InspectConfig;

/// Plugin name for hash nodes in inspected schemas.
pub const KEY_VALUE: &str = "keyvalue";

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub valid: bool,
    pub value: Value,
    pub errors: ErrorTree,
}

/// Runs one command and prints its JSON result. `false` means the input was invalid.
pub fn run(cmd: Cmd, config: &InspectConfig) -> Result<bool> {
    match cmd {
        Cmd::Check {
            schema,
            value,
            mode,
            edits,
        } => {
            let schema = load_schema(&schema)?;
            let value = match value {
                Some(path) => load_json(&path)?,
                None => Value::Null,
            };
            let edits = edits
                .iter()
                .map(String::as_str)
                .map(parse_edit)
                .collect::<Result<Vec<_>>>()?;
            let report = check(
                schema,
                value,
                &edits,
                mode.unwrap_or(config.mode),
                config.return_all,
            )?;
            print(&report)?;
            Ok(report.valid)
        }
        Cmd::Diff {
            schema,
            original,
            value,
        } => {
            let schema = load_schema(&schema)?;
            let changes = diff(schema, load_json(&original)?, load_json(&value)?, config.return_all)?;
            print(&changes)?;
            Ok(true)
        }
        Cmd::Widgets { schema, mode } => {
            let layout = widgets(load_schema(&schema)?, mode.unwrap_or(config.mode))?;
            print(&layout)?;
            Ok(true)
        }
    }
}

fn print(output: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

pub fn load_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    json5::from_str(&text).wrap_err_with(|| format!("parsing {}", path.display()))
}

/// Splits `path=value`. The value is read as JSON5 and falls back to a plain string.
pub fn parse_edit(edit: &str) -> Result<(String, Value)> {
    let Some((path, raw)) = edit.split_once('=') else {
        return Err(eyre!("edit `{edit}` is not of the form PATH=VALUE"));
    };
    let value = json5::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((path.trim().to_string(), value))
}

pub fn load_schema(path: &Path) -> Result<SchemaRef> {
    let spec = SchemaSpec::from_json(load_json(path)?)?;
    let schema = spec.build()?;
    debug!(path = %path.display(), "schema loaded");
    Ok(schema)
}

/// Built-in widgets plus the key/value plugin for hash nodes.
pub fn catalog() -> WidgetCatalog {
    let catalog = WidgetCatalog::with_builtins();
    catalog.register_structural(
        KEY_VALUE,
        Rc::new(|_node, value, _props| Ok(Box::new(KeyValueWidget::new(value)))),
    );
    catalog
}

fn mount(schema: SchemaRef, value: Value, mode: Mode, return_all: bool) -> Result<ParentWidget, FormError> {
    ParentWidget::new(
        ParentProps::new(schema, catalog())
            .mode(mode)
            .value(value)
            .return_all(return_all),
    )
}

pub fn check(
    schema: SchemaRef,
    value: Value,
    edits: &[(String, Value)],
    mode: Mode,
    return_all: bool,
) -> Result<CheckReport> {
    let mut form = mount(schema, value, mode, return_all)?;
    for (path, edit) in edits {
        form.set_at(FieldPath::parse(path).segments(), edit.clone())
            .wrap_err_with(|| format!("applying edit to `{path}`"))?;
    }
    let valid = form.valid();
    info!(%mode, valid, "checked value");
    Ok(CheckReport {
        valid,
        value: form.value(),
        errors: form.displayed_error(),
    })
}

/// What an update form mounted with `original` reports after `value` is written.
pub fn diff(schema: SchemaRef, original: Value, value: Value, return_all: bool) -> Result<Value> {
    let mut form = mount(schema, original, Mode::Update, return_all)?;
    form.set_value(value)?;
    Ok(form.value())
}

pub fn widgets(schema: SchemaRef, mode: Mode) -> Result<Vec<LayoutEntry>> {
    Ok(mount(schema, Value::Null, mode, false)?.layout())
}

/// Free-form object editor used for hash nodes.
pub struct KeyValueWidget {
    original: Value,
    value: Value,
    error: ErrorTree,
    on_change: Option<ChangeHandler>,
}

impl KeyValueWidget {
    pub fn new(value: Value) -> Self {
        Self {
            original: value.clone(),
            value,
            error: ErrorTree::Clear,
            on_change: None,
        }
    }
}

impl Widget for KeyValueWidget {
    fn widget_type(&self) -> &str {
        KEY_VALUE
    }

    fn value(&self) -> Value {
        self.value.clone()
    }

    fn set_value(&mut self, value: Value) -> Result<(), FormError> {
        let old = std::mem::replace(&mut self.value, value);
        if let Some(on_change) = &self.on_change {
            on_change(&self.value, &old);
        }
        Ok(())
    }

    fn valid(&mut self) -> bool {
        let valid = self.value.is_null() || self.value.is_object();
        self.error = if valid {
            ErrorTree::Clear
        } else {
            ErrorTree::message("is not an object")
        };
        valid
    }

    fn error(&mut self, errors: ErrorInput) -> Result<(), FormError> {
        self.error = errors.into_tree();
        Ok(())
    }

    fn displayed_error(&self) -> ErrorTree {
        self.error.clone()
    }

    fn reset(&mut self) {
        self.value = self.original.clone();
        self.error = ErrorTree::Clear;
    }

    fn set_on_change(&mut self, handler: Option<ChangeHandler>) {
        self.on_change = handler;
    }

    fn set_on_enter(&mut self, _handler: Option<EnterHandler>) {}

    fn handle_key(&mut self, _key: Key) -> bool {
        false
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
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> SchemaRef {
        SchemaSpec::from_json(json!({
            "class": "Parent",
            "fields": {
                "name": {"class": "Node", "type": "string", "required": true},
                "age": {"class": "Node", "type": "int"},
                "meta": {"class": "HashNode", "ui": {"widget": "keyvalue"}}
            }
        }))
        .and_then(SchemaSpec::build)
        .unwrap()
    }

    #[test]
    fn check_reports_missing_required_field() {
        let report = check(schema(), json!({"age": 3}), &[], Mode::Create, false).unwrap();
        assert!(!report.valid);
        assert_eq!(report.value, json!({"age": 3}));
        assert_eq!(report.errors.to_json(), json!({"name": "missing"}));
    }

    #[test]
    fn check_accepts_hash_node_objects() {
        let report = check(
            schema(),
            json!({"name": "Ann", "meta": {"k": "v"}}),
            &[],
            Mode::Create,
            false,
        )
        .unwrap();
        assert!(report.valid);
        assert_eq!(report.value, json!({"name": "Ann", "meta": {"k": "v"}}));
    }

    #[test]
    fn edits_are_applied_before_validation() {
        let edits = vec![parse_edit("name=Bob").unwrap(), parse_edit("age = 4").unwrap()];
        assert_eq!(edits[0], ("name".to_string(), json!("Bob")));
        assert_eq!(edits[1], ("age".to_string(), json!(4)));
        let report = check(schema(), Value::Null, &edits, Mode::Create, false).unwrap();
        assert!(report.valid);
        assert_eq!(report.value, json!({"name": "Bob", "age": 4}));

        assert!(parse_edit("name").is_err());
        assert!(check(schema(), Value::Null, &[parse_edit("nope=1").unwrap()], Mode::Create, false).is_err());
    }

    #[test]
    fn diff_lists_only_changed_fields() {
        let changes = diff(
            schema(),
            json!({"name": "Ann", "age": 30}),
            json!({"name": "Ann", "age": 31}),
            false,
        )
        .unwrap();
        assert_eq!(changes, json!({"age": 31}));
    }

    #[test]
    fn widgets_resolve_every_field() {
        let layout = widgets(schema(), Mode::Search).unwrap();
        let mut types: Vec<_> = layout
            .iter()
            .map(|e| (e.field.as_str(), e.widget_type.as_str()))
            .collect();
        types.sort();
        assert_eq!(
            types,
            vec![("age", "number"), ("meta", KEY_VALUE), ("name", "text")]
        );
    }
}
