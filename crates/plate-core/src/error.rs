use thiserror::Error;

use crate::node::NodeKey;

/// Failure to read a serialized node or document record.
///
/// Schema errors are recoverable: callers at the parse boundary log them and
/// fall back to a safe default instead of bringing the host down.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown node type `{0}`")]
    UnknownType(String),

    #[error("`{kind}` record is missing required field `{field}`")]
    MissingField { kind: String, field: &'static str },

    #[error("`{kind}` record has invalid field `{field}`: {reason}")]
    InvalidField {
        kind: String,
        field: &'static str,
        reason: String,
    },

    #[error("`{kind}` record has version {found}, newest supported is {supported}")]
    UnsupportedVersion {
        kind: String,
        found: u32,
        supported: u32,
    },

    #[error("node record is not a JSON object")]
    NotAnObject,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Wiring mistakes. These are fatal: setup must stop instead of degrading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("node type `{0}` is not registered with this editor")]
    UnregisteredNode(String),

    #[error("duplicate node spec kind: {0}")]
    DuplicateNode(String),

    #[error("required node type `{0}` is missing from the registry")]
    MissingRequiredNode(&'static str),
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("node {0} does not exist in this snapshot")]
    UnknownNode(NodeKey),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("editor is read-only")]
    ReadOnly,

    #[error("engine fault: {0}")]
    EngineFault(String),
}

impl EditorError {
    pub fn is_config(&self) -> bool {
        matches!(self, EditorError::Config(_))
    }
}
