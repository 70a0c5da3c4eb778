use std::collections::HashMap;
use std::rc::Rc;

use crate::error::EditorError;
use crate::node::{ElementNode, Node, NodeBody, NodeKey};
use crate::selection::{Point, RangeSelection, Selection};

/// Which side of a range a point bounds. Interior text offsets count the
/// whole text node as touched on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    Start,
    End,
}

/// Immutable whole-document state at one commit point.
///
/// Node payloads are shared between snapshots; a write transaction clones
/// only the nodes it touches.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub(crate) nodes: HashMap<NodeKey, Rc<Node>>,
    pub(crate) selection: Option<Selection>,
    pub(crate) version: u64,
}

impl Snapshot {
    pub(crate) fn empty() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            NodeKey::ROOT,
            Rc::new(Node::new(NodeKey::ROOT, NodeBody::Root(ElementNode::default()))),
        );
        Self {
            nodes,
            selection: None,
            version: 0,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn root(&self) -> &Node {
        // The root is inserted at construction and never collected.
        &self.nodes[&NodeKey::ROOT]
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(&key).map(|n| n.as_ref())
    }

    pub fn get(&self, key: NodeKey) -> Result<&Node, EditorError> {
        self.node(key).ok_or(EditorError::UnknownNode(key))
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root().children().is_empty()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn range_selection(&self) -> Option<&RangeSelection> {
        self.selection.as_ref().and_then(Selection::as_range)
    }

    /// Pre-order walk of `key` and everything below it.
    pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key];
        while let Some(next) = stack.pop() {
            let Some(node) = self.node(next) else {
                continue;
            };
            out.push(next);
            stack.extend(node.children().iter().rev().copied());
        }
        out
    }

    /// Every node reachable from the root, in document order.
    pub fn document_order(&self) -> Vec<NodeKey> {
        self.descendants(NodeKey::ROOT)
    }

    pub fn ancestors(&self, key: NodeKey) -> impl Iterator<Item = &Node> + '_ {
        let mut current = self.node(key).and_then(Node::parent);
        std::iter::from_fn(move || {
            let node = self.node(current?)?;
            current = node.parent();
            Some(node)
        })
    }

    pub fn is_descendant_of(&self, key: NodeKey, ancestor: NodeKey) -> bool {
        key == ancestor || self.ancestors(key).any(|n| n.key() == ancestor)
    }

    /// `key` itself when it is a block, otherwise its nearest block ancestor.
    pub fn nearest_block(&self, key: NodeKey) -> Option<&Node> {
        let node = self.node(key)?;
        if node.body().is_block() {
            return Some(node);
        }
        self.ancestors(key).find(|n| n.body().is_block())
    }

    pub fn index_in_parent(&self, key: NodeKey) -> Option<usize> {
        let parent = self.node(self.node(key)?.parent()?)?;
        parent.children().iter().position(|k| *k == key)
    }

    pub fn text_content(&self, key: NodeKey) -> String {
        self.descendants(key)
            .into_iter()
            .filter_map(|k| self.node(k).and_then(Node::as_text))
            .map(|t| t.text.as_str())
            .collect()
    }

    pub fn last_descendant(&self, key: NodeKey) -> NodeKey {
        let mut current = key;
        while let Some(last) = self.node(current).and_then(|n| n.children().last().copied()) {
            current = last;
        }
        current
    }

    /// The node a point sits in: a text node, or for a container point the
    /// child the caret is in front of (the container itself past the end).
    pub fn point_node(&self, point: &Point) -> Option<NodeKey> {
        let node = self.node(point.key)?;
        if !node.is_container() {
            return Some(point.key);
        }
        match node.children().get(point.offset) {
            Some(child) => Some(*child),
            None => Some(point.key),
        }
    }

    pub(crate) fn order_index(&self) -> (Vec<NodeKey>, HashMap<NodeKey, usize>) {
        let order = self.document_order();
        let index = order.iter().enumerate().map(|(ix, k)| (*k, ix)).collect();
        (order, index)
    }

    /// Comparable document position of a point.
    fn point_position(&self, point: &Point, index: &HashMap<NodeKey, usize>) -> (usize, usize) {
        let Some(node) = self.node(point.key) else {
            return (usize::MAX, usize::MAX);
        };
        if !node.is_container() {
            return (index.get(&point.key).copied().unwrap_or(usize::MAX), point.offset);
        }
        match node.children().get(point.offset) {
            Some(child) => (index.get(child).copied().unwrap_or(usize::MAX), 0),
            None => {
                let last = self.last_descendant(point.key);
                (index.get(&last).copied().unwrap_or(usize::MAX), usize::MAX)
            }
        }
    }

    /// (start, end) of a range in document order.
    pub fn ordered_points(&self, range: &RangeSelection) -> (Point, Point) {
        let (_, index) = self.order_index();
        if self.point_position(&range.focus, &index) < self.point_position(&range.anchor, &index)
        {
            (range.focus, range.anchor)
        } else {
            (range.anchor, range.focus)
        }
    }

    pub fn is_backward(&self, range: &RangeSelection) -> bool {
        let (start, _) = self.ordered_points(range);
        start != range.anchor
    }

    /// Number of leaves in document order that precede `point`.
    pub(crate) fn leaf_boundary(
        &self,
        point: &Point,
        edge: Edge,
        order: &[NodeKey],
        index: &HashMap<NodeKey, usize>,
    ) -> usize {
        let leaves_before = |doc_ix: usize| {
            order[..doc_ix.min(order.len())]
                .iter()
                .filter(|k| self.node(**k).is_some_and(|n| !n.is_container()))
                .count()
        };

        let Some(node) = self.node(point.key) else {
            return 0;
        };
        let Some(&doc_ix) = index.get(&point.key) else {
            return 0;
        };

        match node.body() {
            NodeBody::Text(text) => {
                let len = text.text.len();
                let after = if point.offset == 0 {
                    false
                } else if point.offset >= len {
                    true
                } else {
                    edge == Edge::End
                };
                leaves_before(doc_ix) + usize::from(after)
            }
            _ if !node.is_container() => leaves_before(doc_ix),
            _ => match node.children().get(point.offset) {
                Some(child) => leaves_before(index.get(child).copied().unwrap_or(doc_ix)),
                None => {
                    let last = self.last_descendant(point.key);
                    leaves_before(index.get(&last).copied().unwrap_or(doc_ix) + 1)
                }
            },
        }
    }

    /// Leaves (text and media) covered by a non-collapsed range, in document
    /// order. Leaves only touched at a zero-width edge are excluded.
    pub fn leaves_in_range(&self, range: &RangeSelection) -> Vec<NodeKey> {
        if range.is_collapsed() {
            return Vec::new();
        }
        let (start, end) = self.ordered_points(range);
        let (order, index) = self.order_index();
        let from = self.leaf_boundary(&start, Edge::Start, &order, &index);
        let to = self.leaf_boundary(&end, Edge::End, &order, &index);
        if from >= to {
            return Vec::new();
        }
        order
            .into_iter()
            .filter(|k| self.node(*k).is_some_and(|n| !n.is_container()))
            .skip(from)
            .take(to - from)
            .collect()
    }

    /// Nodes a selection touches: the caret node when collapsed, the covered
    /// leaves otherwise, falling back to the anchor node.
    pub fn touched_nodes(&self, range: &RangeSelection) -> Vec<NodeKey> {
        if !range.is_collapsed() {
            let leaves = self.leaves_in_range(range);
            if !leaves.is_empty() {
                return leaves;
            }
        }
        self.point_node(&range.anchor).into_iter().collect()
    }

    /// Blocks (paragraphs / headings) touched by a range, in document order.
    pub fn blocks_in_range(&self, range: &RangeSelection) -> Vec<NodeKey> {
        let (start, end) = self.ordered_points(range);
        let block_of = |point: &Point| {
            self.point_node(point)
                .and_then(|k| self.nearest_block(k))
                .map(Node::key)
        };
        let (Some(first), Some(last)) = (block_of(&start), block_of(&end)) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut inside = false;
        for key in self.document_order() {
            let Some(node) = self.node(key) else {
                continue;
            };
            if !node.body().is_block() {
                continue;
            }
            if key == first {
                inside = true;
            }
            if inside {
                out.push(key);
            }
            if key == last {
                break;
            }
        }
        out
    }
}
