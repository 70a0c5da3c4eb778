use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{ConfigError, EditorError, SchemaError};
use crate::node::{HeadingTag, NodeBody, NodeKey, TextFormat, TextNode, kind};
use crate::project::{DomElement, patch_in_place};
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Root,
    Block,
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildConstraint {
    None,
    BlockOnly,
    InlineOnly,
}

/// Behavior table for one node type, looked up by type tag.
#[derive(Clone, Copy)]
pub struct NodeSpec {
    pub kind: &'static str,
    pub role: NodeRole,
    pub is_void: bool,
    pub children: ChildConstraint,
    /// Newest record version this type writes and reads.
    pub version: u32,
    /// Type-specific record fields. `type`, `version` and `children` are
    /// added by the serializer.
    pub export_json: fn(&NodeBody) -> Map<String, Value>,
    pub import_json: fn(&Value) -> Result<NodeBody, SchemaError>,
    /// Upgrades a record written at an older version to `version`.
    pub migrate: fn(u32, Value) -> Result<Value, SchemaError>,
    pub create_dom: fn(&NodeBody) -> DomElement,
    /// Returns false when the live element must be recreated instead of
    /// patched.
    pub update_dom: fn(&NodeBody, &NodeBody) -> bool,
    pub export_dom: fn(&NodeBody) -> DomElement,
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("kind", &self.kind)
            .field("role", &self.role)
            .field("is_void", &self.is_void)
            .field("children", &self.children)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl NodeSpec {
    /// Checks the record version and runs the migration hook for older ones.
    pub fn upgrade(&self, record: &Value) -> Result<Value, SchemaError> {
        if !record.is_object() {
            return Err(SchemaError::NotAnObject);
        }
        let found = match record.get("version") {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| SchemaError::InvalidField {
                    kind: self.kind.to_string(),
                    field: "version",
                    reason: format!("expected a non-negative integer, got {v}"),
                })?,
        };
        if found > self.version {
            return Err(SchemaError::UnsupportedVersion {
                kind: self.kind.to_string(),
                found,
                supported: self.version,
            });
        }
        if found == self.version {
            return Ok(record.clone());
        }
        tracing::debug!(kind = self.kind, from = found, to = self.version, "migrating node record");
        (self.migrate)(found, record.clone())
    }
}

pub fn no_migration(_from: u32, record: Value) -> Result<Value, SchemaError> {
    Ok(record)
}

/// A fix-up run on the draft before commit until nothing changes.
pub trait NormalizePass {
    fn id(&self) -> &'static str;
    fn run(&self, tx: &mut Transaction<'_>) -> Result<bool, EditorError>;
}

/// A bundle of node types and normalization passes.
pub trait PlatePlugin {
    fn id(&self) -> &'static str;
    fn node_specs(&self) -> Vec<NodeSpec> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
}

/// Node types registered with one editor instance.
#[derive(Default)]
pub struct NodeRegistry {
    node_specs: HashMap<&'static str, NodeSpec>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
}

impl NodeRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn PlatePlugin>>) -> Result<Self, ConfigError> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    /// Root, paragraph and text: the minimum every editor needs.
    pub fn core() -> Self {
        Self::builtin(vec![Box::new(CoreNodesPlugin), Box::new(CoreNormalizePlugin)])
    }

    /// Core plus heading, link and image.
    pub fn richtext() -> Self {
        Self::builtin(vec![
            Box::new(CoreNodesPlugin),
            Box::new(CoreNormalizePlugin),
            Box::new(HeadingPlugin),
            Box::new(crate::link::LinkPlugin),
            Box::new(crate::media::ImagePlugin),
        ])
    }

    // Built-in plugins declare disjoint kinds, so no duplicate check is needed.
    fn builtin(plugins: Vec<Box<dyn PlatePlugin>>) -> Self {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.insert_plugin(plugin);
        }
        registry
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn PlatePlugin>) -> Result<(), ConfigError> {
        for spec in plugin.node_specs() {
            if self.node_specs.contains_key(spec.kind) {
                return Err(ConfigError::DuplicateNode(spec.kind.to_string()));
            }
        }
        self.insert_plugin(plugin);
        Ok(())
    }

    fn insert_plugin(&mut self, plugin: Box<dyn PlatePlugin>) {
        tracing::trace!(plugin = plugin.id(), "registering plugin");
        for spec in plugin.node_specs() {
            self.node_specs.insert(spec.kind, spec);
        }
        self.normalize_passes.extend(plugin.normalize_passes());
    }

    pub fn spec(&self, kind: &str) -> Option<&NodeSpec> {
        self.node_specs.get(kind)
    }

    pub fn has(&self, kind: &str) -> bool {
        self.node_specs.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.node_specs.keys().copied()
    }

    pub fn ensure_registered(&self, kind: &str) -> Result<(), ConfigError> {
        if self.has(kind) {
            Ok(())
        } else {
            Err(ConfigError::UnregisteredNode(kind.to_string()))
        }
    }

    /// Spec for a serialized record's `type`. A known type this editor never
    /// registered is a wiring error; anything else is a bad record.
    pub fn spec_for_record(&self, kind: &str) -> Result<&NodeSpec, EditorError> {
        if let Some(spec) = self.spec(kind) {
            return Ok(spec);
        }
        if kind::BUILTIN.contains(&kind) {
            return Err(ConfigError::UnregisteredNode(kind.to_string()).into());
        }
        Err(SchemaError::UnknownType(kind.to_string()).into())
    }

    pub fn normalize_passes(&self) -> impl Iterator<Item = &dyn NormalizePass> + '_ {
        self.normalize_passes.iter().map(|p| p.as_ref())
    }
}

pub(crate) fn required_str<'v>(
    record: &'v Value,
    kind: &str,
    field: &'static str,
) -> Result<&'v str, SchemaError> {
    match record.get(field) {
        None | Some(Value::Null) => Err(SchemaError::MissingField {
            kind: kind.to_string(),
            field,
        }),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(SchemaError::InvalidField {
            kind: kind.to_string(),
            field,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

pub(crate) fn optional_str(
    record: &Value,
    kind: &str,
    field: &'static str,
) -> Result<Option<String>, SchemaError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(SchemaError::InvalidField {
            kind: kind.to_string(),
            field,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn element_fields(_body: &NodeBody) -> Map<String, Value> {
    Map::new()
}

fn element_dom(tag: &'static str) -> DomElement {
    DomElement::new(tag)
}

struct CoreNodesPlugin;

impl PlatePlugin for CoreNodesPlugin {
    fn id(&self) -> &'static str {
        "core.nodes"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![
            NodeSpec {
                kind: kind::ROOT,
                role: NodeRole::Root,
                is_void: false,
                children: ChildConstraint::BlockOnly,
                version: 1,
                export_json: element_fields,
                import_json: |_| Ok(NodeBody::Root(Default::default())),
                migrate: no_migration,
                create_dom: |_| element_dom("div"),
                update_dom: patch_in_place,
                export_dom: |_| element_dom("div"),
            },
            NodeSpec {
                kind: kind::PARAGRAPH,
                role: NodeRole::Block,
                is_void: false,
                children: ChildConstraint::InlineOnly,
                version: 1,
                export_json: element_fields,
                import_json: |_| Ok(NodeBody::paragraph()),
                migrate: no_migration,
                create_dom: |_| element_dom("p"),
                update_dom: patch_in_place,
                export_dom: |_| element_dom("p"),
            },
            NodeSpec {
                kind: kind::TEXT,
                role: NodeRole::Inline,
                is_void: false,
                children: ChildConstraint::None,
                version: 1,
                export_json: text_fields,
                import_json: import_text,
                migrate: no_migration,
                create_dom: text_dom,
                update_dom: patch_in_place,
                export_dom: export_text_dom,
            },
        ]
    }
}

fn text_fields(body: &NodeBody) -> Map<String, Value> {
    let mut map = Map::new();
    if let NodeBody::Text(text) = body {
        map.insert("text".into(), Value::String(text.text.clone()));
        map.insert("format".into(), Value::from(text.format.bits()));
        map.insert("style".into(), Value::String(text.style.clone()));
    }
    map
}

fn import_text(record: &Value) -> Result<NodeBody, SchemaError> {
    let text = required_str(record, kind::TEXT, "text")?;
    let format = match record.get("format") {
        None | Some(Value::Null) => TextFormat::empty(),
        Some(v) => v
            .as_u64()
            .and_then(|bits| u32::try_from(bits).ok())
            .map(TextFormat::from_bits_truncate)
            .ok_or_else(|| SchemaError::InvalidField {
                kind: kind::TEXT.to_string(),
                field: "format",
                reason: format!("expected an integer bit-set, got {v}"),
            })?,
    };
    let style = optional_str(record, kind::TEXT, "style")?.unwrap_or_default();
    Ok(NodeBody::Text(
        TextNode::new(text).with_format(format).with_style(style),
    ))
}

fn text_dom(body: &NodeBody) -> DomElement {
    let NodeBody::Text(text) = body else {
        return DomElement::new("span");
    };
    let mut el = DomElement::new("span");
    if !text.format.is_empty() {
        el = el.attr("data-format", text.format.bits().to_string());
    }
    if !text.style.is_empty() {
        el = el.attr("style", text.style.clone());
    }
    el.text(text.text.clone())
}

const FORMAT_TAGS: [(TextFormat, &str); 7] = [
    (TextFormat::CODE, "code"),
    (TextFormat::SUBSCRIPT, "sub"),
    (TextFormat::SUPERSCRIPT, "sup"),
    (TextFormat::STRIKETHROUGH, "s"),
    (TextFormat::UNDERLINE, "u"),
    (TextFormat::ITALIC, "em"),
    (TextFormat::BOLD, "strong"),
];

fn export_text_dom(body: &NodeBody) -> DomElement {
    let NodeBody::Text(text) = body else {
        return DomElement::new("span");
    };
    let mut el = DomElement::new("span");
    if !text.style.is_empty() {
        el = el.attr("style", text.style.clone());
    }
    el = el.text(text.text.clone());
    for (flag, tag) in FORMAT_TAGS {
        if text.format.contains(flag) {
            el = DomElement::new(tag).child(el);
        }
    }
    el
}

pub struct HeadingPlugin;

impl PlatePlugin for HeadingPlugin {
    fn id(&self) -> &'static str {
        "heading"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: kind::HEADING,
            role: NodeRole::Block,
            is_void: false,
            children: ChildConstraint::InlineOnly,
            version: 1,
            export_json: heading_fields,
            import_json: import_heading,
            migrate: no_migration,
            create_dom: heading_dom,
            // A level change swaps the element tag.
            update_dom: |prev, next| match (prev, next) {
                (NodeBody::Heading(a), NodeBody::Heading(b)) => a.tag == b.tag,
                _ => false,
            },
            export_dom: heading_dom,
        }]
    }
}

fn heading_fields(body: &NodeBody) -> Map<String, Value> {
    let mut map = Map::new();
    if let NodeBody::Heading(heading) = body {
        map.insert("tag".into(), Value::String(heading.tag.as_str().into()));
    }
    map
}

fn import_heading(record: &Value) -> Result<NodeBody, SchemaError> {
    let tag = required_str(record, kind::HEADING, "tag")?;
    let tag = HeadingTag::parse(tag).ok_or_else(|| SchemaError::InvalidField {
        kind: kind::HEADING.to_string(),
        field: "tag",
        reason: format!("unknown heading tag `{tag}`"),
    })?;
    Ok(NodeBody::heading(tag))
}

fn heading_dom(body: &NodeBody) -> DomElement {
    match body {
        NodeBody::Heading(heading) => DomElement::new(heading.tag.as_str()),
        _ => DomElement::new("h1"),
    }
}

struct CoreNormalizePlugin;

impl PlatePlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(EnsureNonEmptyRoot), Box::new(RemoveEmptyLinks)]
    }
}

struct EnsureNonEmptyRoot;

impl NormalizePass for EnsureNonEmptyRoot {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_root"
    }

    fn run(&self, tx: &mut Transaction<'_>) -> Result<bool, EditorError> {
        if !tx.state().root().children().is_empty() {
            return Ok(false);
        }
        let paragraph = tx.create_paragraph()?;
        tx.append_child(NodeKey::ROOT, paragraph)?;
        Ok(true)
    }
}

/// A link without content cannot be selected or removed by the user.
struct RemoveEmptyLinks;

impl NormalizePass for RemoveEmptyLinks {
    fn id(&self) -> &'static str {
        "core.remove_empty_links"
    }

    fn run(&self, tx: &mut Transaction<'_>) -> Result<bool, EditorError> {
        let empty: Vec<NodeKey> = tx
            .state()
            .document_order()
            .into_iter()
            .filter(|key| {
                tx.state()
                    .node(*key)
                    .is_some_and(|n| n.as_link().is_some() && n.children().is_empty())
            })
            .collect();
        for key in &empty {
            tx.remove_node(*key)?;
        }
        Ok(!empty.is_empty())
    }
}
