use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use super::{SchemaBuilder, SchemaRef, SchemaTree};
use crate::error::FormError;
use crate::ui::UiHints;

/// Serialized description of a [`SchemaTree`], tagged by `class`.
///
/// ```json
/// { "class": "Parent", "fields": {
///     "name": { "class": "Node", "type": "string", "required": true },
///     "tags": { "class": "ArrayNode", "child": { "class": "Node", "type": "string" } }
/// } }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "class")]
pub enum SchemaSpec {
    Node {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        required: bool,
        #[serde(default)]
        options: Option<Vec<Value>>,
        #[serde(default)]
        minimum: Option<f64>,
        #[serde(default)]
        maximum: Option<f64>,
        #[serde(default)]
        regex: Option<String>,
        #[serde(default)]
        ui: Option<UiHints>,
    },
    ArrayNode {
        child: Box<SchemaSpec>,
        #[serde(default)]
        required: bool,
        #[serde(default)]
        minimum: Option<f64>,
        #[serde(default)]
        maximum: Option<f64>,
        #[serde(default)]
        ui: Option<UiHints>,
    },
    HashNode {
        #[serde(default)]
        required: bool,
        #[serde(default)]
        ui: Option<UiHints>,
    },
    Parent {
        fields: IndexMap<String, SchemaSpec>,
        #[serde(default)]
        required: bool,
        #[serde(default)]
        ui: Option<UiHints>,
    },
}

impl SchemaSpec {
    pub fn from_json(value: Value) -> Result<Self, FormError> {
        serde_json::from_value(value).map_err(|e| FormError::InvalidSchema(e.to_string()))
    }

    pub fn build(self) -> Result<SchemaRef, FormError> {
        let node = match self {
            SchemaSpec::Node {
                type_name,
                required,
                options,
                minimum,
                maximum,
                regex,
                ui,
            } => {
                let mut b = SchemaTree::node(type_name);
                if let Some(options) = options {
                    b = b.options(options);
                }
                if let Some(pattern) = regex {
                    b = b.regex(&pattern)?;
                }
                finish(b, required, minimum, maximum, ui)
            }
            SchemaSpec::ArrayNode {
                child,
                required,
                minimum,
                maximum,
                ui,
            } => finish(
                SchemaTree::array(child.build()?),
                required,
                minimum,
                maximum,
                ui,
            ),
            SchemaSpec::HashNode { required, ui } => {
                finish(SchemaTree::hash(), required, None, None, ui)
            }
            SchemaSpec::Parent {
                fields,
                required,
                ui,
            } => {
                let mut b = SchemaTree::parent();
                for (name, spec) in fields {
                    b = b.field(name, spec.build()?);
                }
                finish(b, required, None, None, ui)
            }
        };
        Ok(node)
    }
}

fn finish(
    mut b: SchemaBuilder,
    required: bool,
    minimum: Option<f64>,
    maximum: Option<f64>,
    ui: Option<UiHints>,
) -> SchemaRef {
    if required {
        b = b.required();
    }
    if let Some(min) = minimum {
        b = b.min(min);
    }
    if let Some(max) = maximum {
        b = b.max(max);
    }
    if let Some(ui) = ui {
        b = b.ui(ui);
    }
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NodeClass;
    use serde_json::json;

    #[test]
    fn builds_nested_tree_in_declared_order() {
        let schema = SchemaSpec::from_json(json!({
            "class": "Parent",
            "fields": {
                "zeta": { "class": "Node", "type": "string", "required": true },
                "alpha": { "class": "ArrayNode", "child": { "class": "Node", "type": "int" } },
                "meta": { "class": "HashNode", "ui": { "widget": "keyvalue" } }
            }
        }))
        .and_then(SchemaSpec::build)
        .unwrap();

        assert_eq!(schema.keys(), vec!["zeta", "alpha", "meta"]);
        assert_eq!(
            schema.get("alpha").unwrap().class().unwrap(),
            NodeClass::ArrayNode
        );
        assert_eq!(
            schema
                .get("meta")
                .and_then(|m| m.ui())
                .and_then(|u| u.widget)
                .as_deref(),
            Some("keyvalue")
        );
        assert!(schema.valid(&json!({"zeta": "x", "alpha": [1, 2]})).is_ok());
    }

    #[test]
    fn unknown_class_is_rejected() {
        let err = SchemaSpec::from_json(json!({"class": "Tuple"})).unwrap_err();
        assert!(matches!(err, FormError::InvalidSchema(_)));
    }
}
