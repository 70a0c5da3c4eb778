use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EditorError, SchemaError};
use crate::node::{NodeKey, kind};
use crate::plugin::NodeRegistry;
use crate::snapshot::Snapshot;
use crate::transaction::Transaction;

const DEFAULT_SCHEMA: &str = "manos-plate";
const DEFAULT_VERSION: u32 = 1;

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_version() -> u32 {
    DEFAULT_VERSION
}

/// Persisted document envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateValue {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub root: Value,
}

impl PlateValue {
    pub fn from_root(root: Value) -> Self {
        Self {
            schema: default_schema(),
            version: default_version(),
            root,
        }
    }

    pub fn from_snapshot(state: &Snapshot, registry: &NodeRegistry) -> Result<Self, EditorError> {
        Ok(Self::from_root(serialize_node(state, registry, NodeKey::ROOT)?))
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(s: &str) -> Result<Self, SchemaError> {
        let value: Self = serde_json::from_str(s)?;
        if value.version > DEFAULT_VERSION {
            return Err(SchemaError::UnsupportedVersion {
                kind: value.schema,
                found: value.version,
                supported: DEFAULT_VERSION,
            });
        }
        Ok(value)
    }

    /// Replaces the document under the root with the envelope's content.
    pub fn read_into(&self, tx: &mut Transaction<'_>) -> Result<(), EditorError> {
        let root_kind = self.root.get("type").and_then(Value::as_str);
        if root_kind != Some(kind::ROOT) {
            return Err(SchemaError::InvalidField {
                kind: kind::ROOT.to_string(),
                field: "type",
                reason: format!("document root must be `{}`", kind::ROOT),
            }
            .into());
        }
        let root_spec = tx.registry().spec_for_record(kind::ROOT)?;
        let root = root_spec.upgrade(&self.root)?;

        // Build the whole new tree before touching the old one.
        let children = match root.get("children") {
            Some(Value::Array(children)) => children.as_slice(),
            _ => &[],
        };
        let mut built = Vec::with_capacity(children.len());
        for child in children {
            built.push(tx.deserialize_node(child)?);
        }

        for old in tx.state().root().children().to_vec() {
            tx.remove_node(old)?;
        }
        for key in built {
            tx.append_child(NodeKey::ROOT, key)?;
        }
        Ok(())
    }
}

/// Serializes `key` and its subtree. Keys are not part of the record.
pub fn serialize_node(
    state: &Snapshot,
    registry: &NodeRegistry,
    key: NodeKey,
) -> Result<Value, EditorError> {
    let node = state.get(key)?;
    let spec = registry.spec_for_record(node.kind())?;

    let mut record = Map::new();
    record.insert("type".into(), Value::String(spec.kind.to_string()));
    record.insert("version".into(), Value::from(spec.version));
    record.extend((spec.export_json)(node.body()));
    if node.is_container() {
        let children = node
            .children()
            .iter()
            .map(|child| serialize_node(state, registry, *child))
            .collect::<Result<Vec<_>, _>>()?;
        record.insert("children".into(), Value::Array(children));
    }
    Ok(Value::Object(record))
}
