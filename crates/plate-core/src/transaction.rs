use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;

use serde_json::Value;

use crate::error::{ConfigError, EditorError, SchemaError};
use crate::node::{ImageNode, LinkNode, Node, NodeBody, NodeKey, TextFormat, TextNode};
use crate::plugin::{ChildConstraint, NodeRegistry, NodeRole};
use crate::selection::{NodeSelection, Point, RangeSelection, Selection};
use crate::snapshot::Snapshot;

/// Source of fresh node keys for one editor instance.
#[derive(Debug)]
pub(crate) struct KeyAllocator {
    next: u64,
}

impl KeyAllocator {
    pub(crate) fn new() -> Self {
        Self { next: 1 }
    }

    fn allocate(&mut self) -> NodeKey {
        let key = NodeKey::from_raw(self.next);
        self.next += 1;
        key
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionMeta {
    pub source: Option<String>,
}

/// The only context in which nodes may be created or mutated and the
/// selection replaced. Work happens on a private draft; nothing is visible to
/// readers until the owning editor commits it.
pub struct Transaction<'a> {
    registry: &'a NodeRegistry,
    keys: &'a mut KeyAllocator,
    state: Snapshot,
    dirty: BTreeSet<NodeKey>,
    meta: TransactionMeta,
}

pub(crate) struct Committed {
    pub(crate) state: Snapshot,
    pub(crate) dirty: BTreeSet<NodeKey>,
    pub(crate) meta: TransactionMeta,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(
        registry: &'a NodeRegistry,
        keys: &'a mut KeyAllocator,
        base: &Snapshot,
        source: Option<String>,
    ) -> Self {
        Self {
            registry,
            keys,
            state: base.clone(),
            dirty: BTreeSet::new(),
            meta: TransactionMeta { source },
        }
    }

    pub fn registry(&self) -> &'a NodeRegistry {
        self.registry
    }

    /// Read view of the draft.
    pub fn state(&self) -> &Snapshot {
        &self.state
    }

    pub fn node(&self, key: NodeKey) -> Result<&Node, EditorError> {
        self.state.get(key)
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.state.selection()
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.meta.source = Some(source.into());
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.state.selection = selection;
    }

    /// Places a range selection and seeds its caret format from the text
    /// node under the anchor.
    pub fn select_range(&mut self, anchor: Point, focus: Point) {
        let format = self
            .state
            .node(anchor.key)
            .and_then(Node::as_text)
            .map(|t| t.format)
            .unwrap_or_default();
        self.state.selection =
            Some(Selection::Range(RangeSelection::new(anchor, focus).with_format(format)));
    }

    pub fn select_caret(&mut self, point: Point) {
        self.select_range(point, point);
    }

    pub fn select_nodes(&mut self, keys: impl IntoIterator<Item = NodeKey>) {
        self.state.selection = Some(Selection::Node(NodeSelection::new(keys)));
    }

    /// Replaces only the pending caret format of a range selection.
    pub fn set_pending_format(&mut self, format: TextFormat) {
        if let Some(Selection::Range(range)) = &mut self.state.selection {
            range.format = format;
        }
    }

    /// Creates a detached node. Fails fast when the type is not registered.
    pub fn create_node(&mut self, body: NodeBody) -> Result<NodeKey, EditorError> {
        self.registry.ensure_registered(body.kind())?;
        let key = self.keys.allocate();
        self.state.nodes.insert(key, Rc::new(Node::new(key, body)));
        self.dirty.insert(key);
        Ok(key)
    }

    pub fn create_paragraph(&mut self) -> Result<NodeKey, EditorError> {
        self.create_node(NodeBody::paragraph())
    }

    pub fn create_text(&mut self, text: TextNode) -> Result<NodeKey, EditorError> {
        self.create_node(NodeBody::Text(text))
    }

    pub fn create_link(&mut self, link: LinkNode) -> Result<NodeKey, EditorError> {
        self.create_node(NodeBody::Link(link))
    }

    pub fn create_image(&mut self, image: ImageNode) -> Result<NodeKey, EditorError> {
        self.create_node(NodeBody::Image(image))
    }

    /// Builds a detached subtree from a serialized node record.
    pub fn deserialize_node(&mut self, value: &Value) -> Result<NodeKey, EditorError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaError::MissingField {
                kind: "node".into(),
                field: "type",
            })?;
        let registry = self.registry;
        let spec = registry.spec_for_record(kind)?;
        let record = spec.upgrade(value)?;
        let body = (spec.import_json)(&record)?;
        let key = self.create_node(body)?;

        if self.node(key)?.is_container() {
            let children = match record.get("children") {
                Some(Value::Array(children)) => children.as_slice(),
                _ => &[],
            };
            for child in children {
                let child_key = self.deserialize_node(child)?;
                self.append_child(key, child_key)?;
            }
        }
        Ok(key)
    }

    fn node_mut(&mut self, key: NodeKey) -> Result<&mut Node, EditorError> {
        let node = self
            .state
            .nodes
            .get_mut(&key)
            .ok_or(EditorError::UnknownNode(key))?;
        self.dirty.insert(key);
        Ok(Rc::make_mut(node))
    }

    pub fn text_mut(&mut self, key: NodeKey) -> Result<&mut TextNode, EditorError> {
        match self.node_mut(key)?.body_mut() {
            NodeBody::Text(t) => Ok(t),
            other => Err(wrong_kind(key, "text", other.kind())),
        }
    }

    pub fn link_mut(&mut self, key: NodeKey) -> Result<&mut LinkNode, EditorError> {
        match self.node_mut(key)?.body_mut() {
            NodeBody::Link(l) => Ok(l),
            other => Err(wrong_kind(key, "link", other.kind())),
        }
    }

    pub fn image_mut(&mut self, key: NodeKey) -> Result<&mut ImageNode, EditorError> {
        match self.node_mut(key)?.body_mut() {
            NodeBody::Image(i) => Ok(i),
            other => Err(wrong_kind(key, "image", other.kind())),
        }
    }

    fn children_mut(&mut self, key: NodeKey) -> Result<&mut Vec<NodeKey>, EditorError> {
        let node = self.node_mut(key)?;
        let kind = node.kind();
        node.body_mut().children_mut().ok_or_else(|| {
            EditorError::EngineFault(format!("{kind} node {key} cannot hold children"))
        })
    }

    fn position(&self, key: NodeKey) -> Result<(NodeKey, usize), EditorError> {
        let parent = self.node(key)?.parent().ok_or(EditorError::UnknownNode(key))?;
        let index = self
            .state
            .index_in_parent(key)
            .ok_or_else(|| EditorError::EngineFault(format!("{key} missing from its parent")))?;
        Ok((parent, index))
    }

    /// Unlinks `key` from its parent. When `collapse` is set, carets inside
    /// the subtree move to the gap it leaves behind; a plain move keeps them.
    fn detach(&mut self, key: NodeKey, collapse: bool) -> Result<(), EditorError> {
        if self.node(key)?.parent().is_none() {
            return Ok(());
        }
        let (parent, index) = self.position(key)?;

        let removed: HashSet<NodeKey> = if collapse {
            self.state.descendants(key).into_iter().collect()
        } else {
            HashSet::new()
        };
        self.remap_points(|point| {
            if removed.contains(&point.key) {
                Some(Point::new(parent, index))
            } else if point.key == parent && point.offset > index {
                Some(Point::new(parent, point.offset - 1))
            } else {
                None
            }
        });
        if let Some(Selection::Node(nodes)) = &mut self.state.selection {
            nodes.retain(|k| !removed.contains(k));
        }

        self.children_mut(parent)?.remove(index);
        self.node_mut(key)?.set_parent(None);
        Ok(())
    }

    fn remap_points(&mut self, f: impl Fn(&Point) -> Option<Point>) {
        if let Some(Selection::Range(range)) = &mut self.state.selection {
            for point in [&mut range.anchor, &mut range.focus] {
                if let Some(next) = f(point) {
                    *point = next;
                }
            }
        }
    }

    /// Inserts (or moves) `child` under `parent` at `index`.
    pub fn insert_child(
        &mut self,
        parent: NodeKey,
        index: usize,
        child: NodeKey,
    ) -> Result<(), EditorError> {
        if child == NodeKey::ROOT || self.state.is_descendant_of(parent, child) {
            return Err(EditorError::EngineFault(format!(
                "cannot insert {child} below itself"
            )));
        }
        self.detach(child, false)?;
        let children = self.children_mut(parent)?;
        let index = index.min(children.len());
        children.insert(index, child);
        self.node_mut(child)?.set_parent(Some(parent));
        self.remap_points(|point| {
            (point.key == parent && point.offset > index)
                .then(|| Point::new(parent, point.offset + 1))
        });
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), EditorError> {
        let len = self.node(parent)?.children().len();
        self.insert_child(parent, len, child)
    }

    pub fn insert_after(&mut self, sibling: NodeKey, node: NodeKey) -> Result<(), EditorError> {
        let (parent, index) = self.position(sibling)?;
        self.insert_child(parent, index + 1, node)
    }

    pub fn insert_before(&mut self, sibling: NodeKey, node: NodeKey) -> Result<(), EditorError> {
        let (parent, index) = self.position(sibling)?;
        self.insert_child(parent, index, node)
    }

    /// Detaches `key`. Unreachable nodes are collected at commit.
    pub fn remove_node(&mut self, key: NodeKey) -> Result<(), EditorError> {
        if key == NodeKey::ROOT {
            return Err(EditorError::EngineFault("the root cannot be removed".into()));
        }
        self.detach(key, true)
    }

    /// Replaces a container with a freshly created one of another type,
    /// carrying its children and any caret over.
    pub fn replace_container(
        &mut self,
        old: NodeKey,
        body: NodeBody,
    ) -> Result<NodeKey, EditorError> {
        let (parent, index) = self.position(old)?;
        let new = self.create_node(body)?;
        if !self.node(new)?.is_container() {
            return Err(EditorError::EngineFault(format!(
                "replacement for {old} is not a container"
            )));
        }

        let children = std::mem::take(self.children_mut(old)?);
        for child in &children {
            self.node_mut(*child)?.set_parent(Some(new));
        }
        *self.children_mut(new)? = children;

        self.children_mut(parent)?[index] = new;
        self.node_mut(new)?.set_parent(Some(parent));
        self.node_mut(old)?.set_parent(None);

        self.remap_points(|point| (point.key == old).then(|| Point::new(new, point.offset)));
        if let Some(Selection::Node(nodes)) = &mut self.state.selection {
            if nodes.contains(old) {
                nodes.retain(|k| *k != old);
                nodes.add(new);
            }
        }
        Ok(new)
    }

    /// Moves the children of `key` into its parent at its position and
    /// removes it.
    pub fn unwrap_node(&mut self, key: NodeKey) -> Result<(), EditorError> {
        let (parent, index) = self.position(key)?;
        let children = self.node(key)?.children().to_vec();
        let count = children.len();

        // Carets on the wrapper's own child slots, resolved before the moves
        // shift them.
        let on_wrapper = |point: &Point| {
            (point.key == key).then(|| Point::new(parent, index + point.offset.min(count)))
        };
        let (anchor, focus) = match self.state.range_selection() {
            Some(range) => (on_wrapper(&range.anchor), on_wrapper(&range.focus)),
            None => (None, None),
        };

        for (offset, child) in children.into_iter().enumerate() {
            self.insert_child(parent, index + offset, child)?;
        }
        if let Some(Selection::Range(range)) = &mut self.state.selection {
            if let Some(anchor) = anchor {
                range.anchor = anchor;
            }
            if let Some(focus) = focus {
                range.focus = focus;
            }
        }
        // The wrapper is empty now and sits right after the moved children.
        self.children_mut(parent)?.retain(|k| *k != key);
        self.node_mut(key)?.set_parent(None);
        Ok(())
    }

    /// Wraps consecutive siblings in a new container inserted where the first
    /// of them was.
    pub fn wrap_nodes(&mut self, keys: &[NodeKey], body: NodeBody) -> Result<NodeKey, EditorError> {
        let Some(first) = keys.first() else {
            return Err(EditorError::InvalidSelection("nothing to wrap".into()));
        };
        let (parent, index) = self.position(*first)?;
        let wrapper = self.create_node(body)?;
        self.insert_child(parent, index, wrapper)?;
        for key in keys {
            self.append_child(wrapper, *key)?;
        }
        Ok(wrapper)
    }

    /// Splits a text node at a byte offset. The original keeps the left part;
    /// the right part becomes a new sibling, which is returned. No split
    /// happens at either end of the text.
    pub fn split_text(
        &mut self,
        key: NodeKey,
        offset: usize,
    ) -> Result<Option<NodeKey>, EditorError> {
        let node = self.node(key)?;
        let text = node
            .as_text()
            .cloned()
            .ok_or_else(|| wrong_kind(key, "text", node.kind()))?;
        let offset = clamp_to_char_boundary(&text.text, offset);
        if offset == 0 || offset >= text.text.len() {
            return Ok(None);
        }

        let right = TextNode {
            text: text.text[offset..].to_string(),
            format: text.format,
            style: text.style.clone(),
        };
        self.text_mut(key)?.text.truncate(offset);
        let right_key = self.create_text(right)?;
        self.insert_after(key, right_key)?;

        self.remap_points(|point| {
            (point.key == key && point.offset > offset)
                .then(|| Point::new(right_key, point.offset - offset))
        });
        Ok(Some(right_key))
    }

    fn split_range_edges(&mut self, range: &RangeSelection) -> Result<(), EditorError> {
        let (start, end) = self.state.ordered_points(range);
        if self.state.node(end.key).is_some_and(|n| n.as_text().is_some()) {
            self.split_text(end.key, end.offset)?;
        }
        if self.state.node(start.key).is_some_and(|n| n.as_text().is_some()) {
            self.split_text(start.key, start.offset)?;
        }
        Ok(())
    }

    /// Splits text at both ends of the current range and returns the text
    /// nodes now lying wholly inside it. The selection is re-anchored on
    /// exactly those nodes.
    pub fn split_selected_text(&mut self) -> Result<Vec<NodeKey>, EditorError> {
        let Some(range) = self.state.range_selection().cloned() else {
            return Ok(Vec::new());
        };
        if range.is_collapsed() {
            return Ok(Vec::new());
        }
        let backward = self.state.is_backward(&range);
        self.split_range_edges(&range)?;

        let Some(range) = self.state.range_selection().cloned() else {
            return Ok(Vec::new());
        };
        let covered: Vec<NodeKey> = self
            .state
            .leaves_in_range(&range)
            .into_iter()
            .filter(|k| self.state.node(*k).is_some_and(|n| n.as_text().is_some()))
            .collect();

        if let (Some(first), Some(last)) = (covered.first(), covered.last()) {
            let last_len = self.node(*last)?.as_text().map_or(0, |t| t.text.len());
            let start = Point::new(*first, 0);
            let end = Point::new(*last, last_len);
            let (anchor, focus) = if backward { (end, start) } else { (start, end) };
            self.state.selection = Some(Selection::Range(
                RangeSelection::new(anchor, focus).with_format(range.format),
            ));
        }
        Ok(covered)
    }

    /// Deletes everything inside a non-collapsed range, merging the last
    /// touched block into the first, and collapses the caret at the start.
    pub fn remove_selected_content(&mut self) -> Result<(), EditorError> {
        let Some(range) = self.state.range_selection().cloned() else {
            return Ok(());
        };
        if range.is_collapsed() {
            return Ok(());
        }

        let (start, end) = self.state.ordered_points(&range);
        if start.key == end.key {
            if let Some(text) = self.state.node(start.key).and_then(Node::as_text) {
                let from = clamp_to_char_boundary(&text.text, start.offset);
                let to = clamp_to_char_boundary(&text.text, end.offset).max(from);
                self.text_mut(start.key)?.text.replace_range(from..to, "");
                self.select_caret(Point::new(start.key, from));
                return Ok(());
            }
        }

        self.split_range_edges(&range)?;
        let Some(range) = self.state.range_selection().cloned() else {
            return Ok(());
        };
        let (start, end) = self.state.ordered_points(&range);

        let block_of = |state: &Snapshot, point: &Point| {
            state
                .point_node(point)
                .and_then(|k| state.nearest_block(k))
                .map(Node::key)
        };
        let start_block = block_of(&self.state, &start);
        let end_block = block_of(&self.state, &end);
        let covered = self.state.leaves_in_range(&range);

        // The caret lands where the first removed leaf used to be.
        let start_is_inner_text = start.offset > 0
            && self.state.node(start.key).is_some_and(|n| n.as_text().is_some());
        let start_is_container = self.state.node(start.key).is_some_and(Node::is_container);
        let caret = if start_is_inner_text || start_is_container {
            start
        } else {
            let (parent, index) = self.position(start.key)?;
            Point::new(parent, index)
        };
        self.select_caret(caret);

        for key in covered {
            self.remove_node(key)?;
        }

        if let (Some(first), Some(last)) = (start_block, end_block) {
            if first != last {
                let between: Vec<NodeKey> = self
                    .state
                    .blocks_in_range(&RangeSelection::new(
                        Point::new(first, 0),
                        Point::new(last, 0),
                    ))
                    .into_iter()
                    .filter(|k| *k != first && *k != last)
                    .collect();
                for key in between {
                    self.remove_node(key)?;
                }
                let trailing = self.node(last)?.children().to_vec();
                for child in trailing {
                    self.append_child(first, child)?;
                }
                self.remove_node(last)?;
            }
        }
        Ok(())
    }

    /// Inserts text at the caret, replacing any selected content first. The
    /// typed text takes the caret's pending format.
    pub fn insert_text(&mut self, text: &str) -> Result<(), EditorError> {
        self.remove_selected_content()?;
        let Some(range) = self.state.range_selection().cloned() else {
            return Err(EditorError::InvalidSelection(
                "insert_text needs a range selection".into(),
            ));
        };
        let caret = range.anchor;
        let format = range.format;
        let collapse_at = |key: NodeKey, offset: usize| {
            Selection::Range(
                RangeSelection::collapsed(Point::new(key, offset)).with_format(format),
            )
        };

        if let Some(existing) = self.state.node(caret.key).and_then(Node::as_text).cloned() {
            let offset = clamp_to_char_boundary(&existing.text, caret.offset);
            if existing.format == format {
                self.text_mut(caret.key)?.text.insert_str(offset, text);
                self.state.selection = Some(collapse_at(caret.key, offset + text.len()));
                return Ok(());
            }

            let new_key = self.create_text(
                TextNode::new(text)
                    .with_format(format)
                    .with_style(existing.style.clone()),
            )?;
            if offset == 0 {
                self.insert_before(caret.key, new_key)?;
            } else {
                self.split_text(caret.key, offset)?;
                self.insert_after(caret.key, new_key)?;
            }
            self.state.selection = Some(collapse_at(new_key, text.len()));
            return Ok(());
        }

        let new_key = self.create_text(TextNode::new(text).with_format(format))?;
        self.place_inline(caret, new_key)?;
        self.state.selection = Some(collapse_at(new_key, text.len()));
        Ok(())
    }

    /// Inserts an inline node at the caret, splitting text as needed. The
    /// caller decides what to select afterwards.
    pub fn insert_inline_at_selection(&mut self, node: NodeKey) -> Result<(), EditorError> {
        self.remove_selected_content()?;
        let Some(range) = self.state.range_selection().cloned() else {
            return Err(EditorError::InvalidSelection(
                "inline insertion needs a range selection".into(),
            ));
        };
        self.place_inline(range.anchor, node)
    }

    fn place_inline(&mut self, caret: Point, node: NodeKey) -> Result<(), EditorError> {
        let target = self.node(caret.key)?;
        let text_len = target.as_text().map(|t| t.text.len());
        let is_container = target.is_container();

        if let Some(len) = text_len {
            if caret.offset == 0 {
                return self.insert_before(caret.key, node);
            }
            if caret.offset < len {
                self.split_text(caret.key, caret.offset)?;
            }
            return self.insert_after(caret.key, node);
        }
        if !is_container {
            return self.insert_after(caret.key, node);
        }
        if caret.key == NodeKey::ROOT {
            let paragraph = self.create_paragraph()?;
            self.insert_child(NodeKey::ROOT, caret.offset, paragraph)?;
            return self.append_child(paragraph, node);
        }
        self.insert_child(caret.key, caret.offset, node)
    }

    /// Normalizes, collects, validates and freezes the draft.
    pub(crate) fn commit(
        mut self,
        max_normalize_iterations: usize,
    ) -> Result<Committed, EditorError> {
        let registry = self.registry;
        let mut settled = false;
        for _ in 0..max_normalize_iterations.max(1) {
            let mut changed = false;
            for pass in registry.normalize_passes() {
                if pass.run(&mut self)? {
                    tracing::trace!(pass = pass.id(), "normalize pass changed the draft");
                    changed = true;
                }
            }
            if !changed {
                settled = true;
                break;
            }
        }
        if !settled {
            return Err(EditorError::EngineFault(format!(
                "normalization did not settle within {max_normalize_iterations} iterations"
            )));
        }

        let reachable: HashSet<NodeKey> = self.state.document_order().into_iter().collect();
        self.state.nodes.retain(|k, _| reachable.contains(k));
        self.dirty.retain(|k| reachable.contains(k));
        self.validate_tree()?;
        self.fix_selection();

        self.state.version += 1;
        Ok(Committed {
            state: self.state,
            dirty: self.dirty,
            meta: self.meta,
        })
    }

    fn validate_tree(&self) -> Result<(), EditorError> {
        for key in self.state.document_order() {
            let node = self.state.get(key)?;
            let spec = self
                .registry
                .spec(node.kind())
                .ok_or_else(|| ConfigError::UnregisteredNode(node.kind().to_string()))?;
            for child_key in node.children() {
                let child = self.state.node(*child_key).ok_or_else(|| {
                    EditorError::EngineFault(format!("{key} references missing child {child_key}"))
                })?;
                if child.parent() != Some(key) {
                    return Err(EditorError::EngineFault(format!(
                        "{child_key} is listed under {key} but points at {:?}",
                        child.parent()
                    )));
                }
                let child_role = self
                    .registry
                    .spec(child.kind())
                    .map(|s| s.role)
                    .unwrap_or(NodeRole::Inline);
                let allowed = match spec.children {
                    ChildConstraint::None => false,
                    ChildConstraint::BlockOnly => child_role == NodeRole::Block,
                    ChildConstraint::InlineOnly => child_role == NodeRole::Inline,
                };
                if !allowed {
                    return Err(EditorError::EngineFault(format!(
                        "{} node {child_key} is not allowed inside {} node {key}",
                        child.kind(),
                        node.kind()
                    )));
                }
            }
        }
        Ok(())
    }

    fn fix_selection(&mut self) {
        let selection = self.state.selection.take();
        let state = &self.state;
        let fixed = match selection {
            None => None,
            Some(Selection::Node(mut nodes)) => {
                nodes.retain(|k| state.contains(*k));
                (!nodes.is_empty()).then_some(Selection::Node(nodes))
            }
            Some(Selection::Range(mut range)) => {
                let clamp = |point: &mut Point| -> bool {
                    let Some(node) = state.node(point.key) else {
                        return false;
                    };
                    point.offset = match node.as_text() {
                        Some(text) => clamp_to_char_boundary(&text.text, point.offset),
                        None => point.offset.min(node.children().len()),
                    };
                    true
                };
                if clamp(&mut range.anchor) && clamp(&mut range.focus) {
                    Some(Selection::Range(range))
                } else {
                    tracing::warn!("dropping selection that points at a collected node");
                    None
                }
            }
        };
        self.state.selection = fixed;
    }
}

fn wrong_kind(key: NodeKey, expected: &str, found: &str) -> EditorError {
    EditorError::InvalidSelection(format!("expected {expected} node at {key}, found {found}"))
}

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}
