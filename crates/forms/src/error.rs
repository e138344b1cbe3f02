use thiserror::Error;

/// Configuration errors raised while mounting or wiring a form.
///
/// These describe a mistake by the integrator (schema, catalog or wiring) and
/// surface immediately. Validation problems are never reported through this
/// type; they are data (see [`crate::ErrorTree`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("unknown widget type: {0}")]
    UnknownWidget(String),

    #[error("hash node `{0}` needs a registered plugin widget")]
    MissingPlugin(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("no widget mapping for primitive type: {0}")]
    UnmappedType(String),

    #[error("unsupported schema class: {0}")]
    UnsupportedClass(String),

    #[error("invalid options binding: target `{target}`, trigger `{trigger}`")]
    InvalidBinding { target: String, trigger: String },

    #[error("cannot address `{0}` inside a leaf widget")]
    NotAStructure(String),

    #[error("array elements are managed by plugin `{0}`")]
    PluginManaged(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// Failure of an asynchronous options producer.
///
/// Cloneable so that the shared fetch outcome can be observed by any number
/// of awaiting parties.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("options fetch failed: {0}")]
pub struct FetchError(pub String);

impl FetchError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
