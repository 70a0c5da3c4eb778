//! Read-only facts about the selection. Everything here is recomputed from a
//! snapshot on demand; nothing is cached between snapshots.

use serde::{Deserialize, Serialize, Serializer};

use crate::node::{HeadingTag, Node, NodeKey, TextFormat, TextFormatType};
use crate::selection::Selection;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Paragraph,
    Heading(HeadingTag),
}

impl BlockType {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading(tag) => tag.as_str(),
        }
    }
}

/// Serialized as its tag (`"paragraph"`, `"h1"`, ...).
impl Serialize for BlockType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInfo {
    pub url: String,
    pub is_existing: bool,
}

/// Formats shared by every text node a range touches. A caret reports its
/// pending format.
pub fn active_text_formats(state: &Snapshot) -> TextFormat {
    let Some(range) = state.range_selection() else {
        return TextFormat::empty();
    };
    if range.is_collapsed() {
        return range.format;
    }
    state
        .leaves_in_range(range)
        .into_iter()
        .filter_map(|key| state.node(key).and_then(Node::as_text))
        .map(|text| text.format)
        .reduce(|acc, format| acc & format)
        .unwrap_or_else(TextFormat::empty)
}

pub fn has_text_format(state: &Snapshot, format: TextFormatType) -> bool {
    active_text_formats(state).contains(format.flag())
}

/// Block type at the selection anchor, `Paragraph` when there is none.
pub fn current_block_type(state: &Snapshot) -> BlockType {
    let anchor = match state.selection() {
        Some(Selection::Range(range)) => state.point_node(&range.anchor),
        Some(Selection::Node(nodes)) => nodes.keys().next(),
        None => None,
    };
    anchor
        .and_then(|key| state.nearest_block(key))
        .and_then(Node::heading_tag)
        .map_or(BlockType::Paragraph, BlockType::Heading)
}

/// Link under the selection. `None` without a range selection; a range with
/// no link reports an empty, non-existing one.
pub fn link_at_selection(state: &Snapshot) -> Option<LinkInfo> {
    let range = state.range_selection()?;
    let found = state.touched_nodes(range).into_iter().find_map(|key| {
        let node = state.node(key)?;
        if let Some(link) = node.as_link() {
            return Some(link.url().to_string());
        }
        let parent = state.node(node.parent()?)?;
        parent.as_link().map(|link| link.url().to_string())
    });
    Some(match found {
        Some(url) => LinkInfo {
            url,
            is_existing: true,
        },
        None => LinkInfo {
            url: String::new(),
            is_existing: false,
        },
    })
}

/// Key of the link node enclosing `key`, if any.
pub fn enclosing_link(state: &Snapshot, key: NodeKey) -> Option<NodeKey> {
    let node = state.node(key)?;
    if node.as_link().is_some() {
        return Some(key);
    }
    state
        .ancestors(key)
        .find(|n| n.as_link().is_some())
        .map(Node::key)
}
