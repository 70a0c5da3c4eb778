use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::rc::Rc;

use crate::node::{NodeBody, NodeKey};
use crate::plugin::NodeRegistry;
use crate::snapshot::Snapshot;

/// Renderable element produced by a node spec. Attribute order is stable so
/// projections compare and print deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DomElement {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<DomChild>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomChild {
    Element(DomElement),
    Text(String),
}

impl DomElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn attr_opt(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.attr(name, value),
            None => self,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(DomChild::Text(text.into()));
        self
    }

    pub fn child(mut self, child: DomElement) -> Self {
        self.children.push(DomChild::Element(child));
        self
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.tag.as_str(), "img" | "br" | "hr")
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        let _ = write!(out, "<{}", self.tag);
        for (name, value) in &self.attrs {
            let _ = write!(out, " {name}=\"{}\"", escape(value, true));
        }
        out.push('>');
        if self.is_void() {
            return;
        }
        for child in &self.children {
            match child {
                DomChild::Element(el) => el.write_html(out),
                DomChild::Text(text) => out.push_str(&escape(text, false)),
            }
        }
        let _ = write!(out, "</{}>", self.tag);
    }
}

fn escape(s: &str, attr: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Renders the live (in-editor) projection of `key` and its subtree.
pub fn project(state: &Snapshot, registry: &NodeRegistry, key: NodeKey) -> Option<DomElement> {
    let node = state.node(key)?;
    let spec = registry.spec(node.kind())?;
    let mut el = (spec.create_dom)(node.body());
    for child in node.children() {
        if let Some(child_el) = project(state, registry, *child) {
            el.children.push(DomChild::Element(child_el));
        }
    }
    Some(el)
}

fn export_subtree(state: &Snapshot, registry: &NodeRegistry, key: NodeKey) -> Option<DomElement> {
    let node = state.node(key)?;
    let spec = registry.spec(node.kind())?;
    let mut el = (spec.export_dom)(node.body());
    for child in node.children() {
        if let Some(child_el) = export_subtree(state, registry, *child) {
            el.children.push(DomChild::Element(child_el));
        }
    }
    Some(el)
}

/// Standalone markup for the whole document, built from each type's external
/// export rather than its live projection.
pub fn export_html(state: &Snapshot, registry: &NodeRegistry) -> String {
    state
        .root()
        .children()
        .iter()
        .filter_map(|key| export_subtree(state, registry, *key))
        .map(|el| el.to_html())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionChange {
    Created,
    Patched,
    Replaced,
    Removed,
}

/// What a renderer has to do to go from `prev` to `next`, per node.
/// Unchanged nodes are omitted.
pub fn diff_projection(
    prev: &Snapshot,
    next: &Snapshot,
    registry: &NodeRegistry,
) -> BTreeMap<NodeKey, ProjectionChange> {
    let mut changes = BTreeMap::new();
    let live: HashSet<NodeKey> = next.document_order().into_iter().collect();

    for key in &live {
        let Some(after) = next.nodes.get(key) else {
            continue;
        };
        let Some(before) = prev.nodes.get(key) else {
            changes.insert(*key, ProjectionChange::Created);
            continue;
        };
        if Rc::ptr_eq(before, after) || before.body() == after.body() {
            continue;
        }
        let patched = registry
            .spec(after.kind())
            .is_some_and(|spec| (spec.update_dom)(before.body(), after.body()));
        let change = if patched {
            ProjectionChange::Patched
        } else {
            ProjectionChange::Replaced
        };
        changes.insert(*key, change);
    }

    for key in prev.document_order() {
        if !live.contains(&key) {
            changes.insert(key, ProjectionChange::Removed);
        }
    }
    changes
}

/// Containers and text patch in place whenever the type tag is stable.
pub(crate) fn patch_in_place(prev: &NodeBody, next: &NodeBody) -> bool {
    prev.kind() == next.kind()
}
