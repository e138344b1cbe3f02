//! The `ui` side channel of a schema node: rendering hints.
//!
//! Hints are plain data deserialized from the schema description, except for
//! a live [`OptionsSource`] which the parent attaches at runtime for dynamic
//! option bindings.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::options::{OptionItem, OptionsSource};
use crate::widget::Mode;

/// Grid key holding the fallback cell size.
pub const DEFAULT_GRID_KEY: &str = "__default__";

/// Rendering hints recognised by the resolver and the synchronizers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Explicit widget type (leaf) or plugin name (structural).
    #[serde(alias = "type", skip_serializing_if = "Option::is_none")]
    pub widget: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// Reason code to display message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
    /// Unit or symbol shown next to numeric inputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adornment: Option<String>,
    /// Join comma separated values with `", "` instead of `","`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_space: Option<bool>,
}

impl UiHints {
    /// Field order configured for `mode`, falling back to the generic order.
    pub fn order_for(&self, mode: Mode) -> Option<&[String]> {
        let per_mode = match mode {
            Mode::Create => self.create.as_deref(),
            Mode::Update => self.update.as_deref(),
            Mode::Search => self.search.as_deref(),
        };
        per_mode.or(self.order.as_deref())
    }

    /// Display text for a reason code.
    pub fn message_for<'a>(&'a self, reason: &'a str) -> &'a str {
        self.errors
            .as_ref()
            .and_then(|table| table.get(reason))
            .map(String::as_str)
            .unwrap_or(reason)
    }

    /// Copy of `self` with `overrides` applied on top.
    pub fn merged(&self, overrides: Option<&UiHints>) -> UiHints {
        let mut out = self.clone();
        out.merge_from_option(overrides);
        out
    }
}

/// Options payload of a hint: fixed pairs, raw strings (each its own label)
/// or a live source.
#[derive(Debug, Clone)]
pub enum OptionsHint {
    Items(Vec<OptionItem>),
    Raw(Vec<String>),
    Source(OptionsSource),
}

impl OptionsHint {
    /// Static items; for a source, its current data.
    pub fn items(&self) -> Vec<OptionItem> {
        match self {
            OptionsHint::Items(items) => items.clone(),
            OptionsHint::Raw(raw) => raw.iter().map(|s| OptionItem::new(s.as_str(), s)).collect(),
            OptionsHint::Source(source) => source.data(),
        }
    }
}

impl PartialEq for OptionsHint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (OptionsHint::Items(a), OptionsHint::Items(b)) => a == b,
            (OptionsHint::Raw(a), OptionsHint::Raw(b)) => a == b,
            (OptionsHint::Source(a), OptionsHint::Source(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Serialize for OptionsHint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OptionsHint::Raw(raw) => raw.serialize(serializer),
            other => other.items().serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for OptionsHint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<Value>::deserialize(deserializer)?;
        if raw.iter().all(Value::is_string) {
            return Ok(OptionsHint::Raw(
                raw.into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ));
        }
        raw.into_iter()
            .map(|v| serde_json::from_value::<OptionItem>(v).map_err(D::Error::custom))
            .collect::<Result<Vec<_>, _>>()
            .map(OptionsHint::Items)
    }
}

/// Responsive cell size of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xs: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sm: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lg: Option<u8>,
}

impl GridSpec {
    /// Full row width.
    pub const FULL: GridSpec = GridSpec {
        xs: Some(12),
        sm: None,
        md: None,
        lg: None,
    };
}

impl Default for GridSpec {
    fn default() -> Self {
        Self::FULL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GridEntry {
    Cell(GridSpec),
    Nested(GridTable),
}

/// Per-field grid sizes with a `__default__` fallback. Entries of structural
/// fields may themselves be tables for the nested fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridTable(pub BTreeMap<String, GridEntry>);

impl GridTable {
    pub fn with_default(spec: GridSpec) -> Self {
        let mut table = BTreeMap::new();
        table.insert(DEFAULT_GRID_KEY.to_string(), GridEntry::Cell(spec));
        GridTable(table)
    }

    pub fn set(mut self, field: impl Into<String>, entry: GridEntry) -> Self {
        self.0.insert(field.into(), entry);
        self
    }

    fn default_cell(&self) -> Option<GridSpec> {
        match self.0.get(DEFAULT_GRID_KEY) {
            Some(GridEntry::Cell(spec)) => Some(*spec),
            _ => None,
        }
    }

    /// Cell size for a leaf field.
    pub fn cell_for(&self, field: &str) -> GridSpec {
        match self.0.get(field) {
            Some(GridEntry::Cell(spec)) => *spec,
            _ => self.default_cell().unwrap_or_default(),
        }
    }

    /// Table handed down to a structural child: its own nested table, or just
    /// the inherited default.
    pub fn narrowed(&self, field: &str) -> GridTable {
        match self.0.get(field) {
            Some(GridEntry::Nested(table)) => table.clone(),
            _ => self
                .default_cell()
                .map(GridTable::with_default)
                .unwrap_or_default(),
        }
    }
}

/// Recursive merging of hint structures; the right-hand side wins.
pub(crate) trait MergeFrom {
    /// Merge from a source of the same type.
    fn merge_from(&mut self, other: &Self);

    /// Merge from an optional source of the same type.
    fn merge_from_option(&mut self, other: Option<&Self>) {
        if let Some(other) = other {
            self.merge_from(other);
        }
    }
}

macro_rules! merge_from_overwrites {
    ($($type:ty),+ $(,)?) => {
        $(
            impl MergeFrom for $type {
                fn merge_from(&mut self, other: &Self) {
                    *self = other.clone();
                }
            }
        )+
    };
}

merge_from_overwrites!(
    bool,
    String,
    Value,
    Vec<String>,
    OptionsHint,
    GridSpec,
    GridEntry,
);

impl<T: Clone + MergeFrom> MergeFrom for Option<T> {
    fn merge_from(&mut self, other: &Self) {
        if let Some(other) = other {
            if let Some(this) = self {
                this.merge_from(other);
            } else {
                self.replace(other.clone());
            }
        }
    }
}

impl<K, V> MergeFrom for BTreeMap<K, V>
where
    K: Clone + Ord,
    V: Clone + MergeFrom,
{
    fn merge_from(&mut self, other: &Self) {
        for (k, v) in other {
            if let Some(existing) = self.get_mut(k) {
                existing.merge_from(v);
            } else {
                self.insert(k.clone(), v.clone());
            }
        }
    }
}

impl MergeFrom for GridTable {
    fn merge_from(&mut self, other: &Self) {
        self.0.merge_from(&other.0);
    }
}

impl MergeFrom for UiHints {
    fn merge_from(&mut self, other: &Self) {
        self.title.merge_from(&other.title);
        self.widget.merge_from(&other.widget);
        self.default.merge_from(&other.default);
        self.create.merge_from(&other.create);
        self.update.merge_from(&other.update);
        self.search.merge_from(&other.search);
        self.order.merge_from(&other.order);
        self.grid.merge_from(&other.grid);
        self.options.merge_from(&other.options);
        self.regex.merge_from(&other.regex);
        self.errors.merge_from(&other.errors);
        self.adornment.merge_from(&other.adornment);
        self.extra_space.merge_from(&other.extra_space);
    }
}
