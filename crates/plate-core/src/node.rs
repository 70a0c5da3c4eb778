use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub mod kind {
    pub const ROOT: &str = "root";
    pub const PARAGRAPH: &str = "paragraph";
    pub const HEADING: &str = "heading";
    pub const TEXT: &str = "text";
    pub const LINK: &str = "link";
    pub const IMAGE: &str = "image";

    /// Every type the engine knows how to build. A type in this list that an
    /// editor has not registered is a wiring error, not a schema error.
    pub const BUILTIN: [&str; 6] = [ROOT, PARAGRAPH, HEADING, TEXT, LINK, IMAGE];
}

/// Opaque node identity. Keys are allocated per editor instance and never
/// reused while that instance is alive; they are not part of the serialized
/// form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(u64);

impl NodeKey {
    pub const ROOT: NodeKey = NodeKey(0);

    pub(crate) fn from_raw(raw: u64) -> Self {
        NodeKey(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Text format bit-set. Bit values are part of the persisted format.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextFormat: u32 {
        const BOLD = 1;
        const ITALIC = 1 << 1;
        const STRIKETHROUGH = 1 << 2;
        const UNDERLINE = 1 << 3;
        const CODE = 1 << 4;
        const SUBSCRIPT = 1 << 5;
        const SUPERSCRIPT = 1 << 6;
    }
}

/// Formats the toolbar can toggle through `toggle-text-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormatType {
    Bold,
    Italic,
    Underline,
    Strikethrough,
}

impl TextFormatType {
    pub const ALL: [TextFormatType; 4] = [
        TextFormatType::Bold,
        TextFormatType::Italic,
        TextFormatType::Underline,
        TextFormatType::Strikethrough,
    ];

    pub fn flag(self) -> TextFormat {
        match self {
            TextFormatType::Bold => TextFormat::BOLD,
            TextFormatType::Italic => TextFormat::ITALIC,
            TextFormatType::Underline => TextFormat::UNDERLINE,
            TextFormatType::Strikethrough => TextFormat::STRIKETHROUGH,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TextFormatType::Bold => "bold",
            TextFormatType::Italic => "italic",
            TextFormatType::Underline => "underline",
            TextFormatType::Strikethrough => "strikethrough",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingTag {
    H1,
    H2,
    H3,
}

impl HeadingTag {
    pub fn as_str(self) -> &'static str {
        match self {
            HeadingTag::H1 => "h1",
            HeadingTag::H2 => "h2",
            HeadingTag::H3 => "h3",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "h1" => Some(HeadingTag::H1),
            "h2" => Some(HeadingTag::H2),
            "h3" => Some(HeadingTag::H3),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextNode {
    pub text: String,
    pub format: TextFormat,
    /// CSS-like `property: value;` declarations.
    pub style: String,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::default(),
            style: String::new(),
        }
    }

    pub fn with_format(mut self, format: TextFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn has_format(&self, format: TextFormat) -> bool {
        self.format.contains(format)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementNode {
    pub children: Vec<NodeKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingNode {
    pub tag: HeadingTag,
    pub children: Vec<NodeKey>,
}

/// Inline container carrying a URL. The URL is never empty: "no link" is
/// expressed by unwrapping the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkNode {
    url: String,
    pub children: Vec<NodeKey>,
}

impl LinkNode {
    pub fn new(url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        if url.is_empty() {
            return None;
        }
        Some(Self {
            url,
            children: Vec::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns false and leaves the node untouched when `url` is empty.
    pub fn set_url(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if url.is_empty() {
            return false;
        }
        self.url = url;
        true
    }
}

/// Atomic media leaf. `src` is non-empty once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageNode {
    src: String,
    pub alt_text: String,
    pub width: Option<String>,
    pub height: Option<String>,
}

impl ImageNode {
    pub fn new(src: impl Into<String>, alt_text: impl Into<String>) -> Option<Self> {
        let src = src.into();
        if src.is_empty() {
            return None;
        }
        Some(Self {
            src,
            alt_text: alt_text.into(),
            width: None,
            height: None,
        })
    }

    pub fn with_size(mut self, width: Option<String>, height: Option<String>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn set_src(&mut self, src: impl Into<String>) -> bool {
        let src = src.into();
        if src.is_empty() {
            return false;
        }
        self.src = src;
        true
    }
}

/// Per-type payload. The variant fixes the node's type tag for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeBody {
    Root(ElementNode),
    Paragraph(ElementNode),
    Heading(HeadingNode),
    Link(LinkNode),
    Text(TextNode),
    Image(ImageNode),
}

impl NodeBody {
    pub fn paragraph() -> Self {
        NodeBody::Paragraph(ElementNode::default())
    }

    pub fn heading(tag: HeadingTag) -> Self {
        NodeBody::Heading(HeadingNode {
            tag,
            children: Vec::new(),
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        NodeBody::Text(TextNode::new(text))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NodeBody::Root(_) => kind::ROOT,
            NodeBody::Paragraph(_) => kind::PARAGRAPH,
            NodeBody::Heading(_) => kind::HEADING,
            NodeBody::Link(_) => kind::LINK,
            NodeBody::Text(_) => kind::TEXT,
            NodeBody::Image(_) => kind::IMAGE,
        }
    }

    pub fn children(&self) -> Option<&[NodeKey]> {
        match self {
            NodeBody::Root(el) | NodeBody::Paragraph(el) => Some(&el.children),
            NodeBody::Heading(h) => Some(&h.children),
            NodeBody::Link(l) => Some(&l.children),
            NodeBody::Text(_) | NodeBody::Image(_) => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeKey>> {
        match self {
            NodeBody::Root(el) | NodeBody::Paragraph(el) => Some(&mut el.children),
            NodeBody::Heading(h) => Some(&mut h.children),
            NodeBody::Link(l) => Some(&mut l.children),
            NodeBody::Text(_) | NodeBody::Image(_) => None,
        }
    }

    /// Paragraphs and headings: the nearest ancestor that decides block type.
    pub fn is_block(&self) -> bool {
        matches!(self, NodeBody::Paragraph(_) | NodeBody::Heading(_))
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            NodeBody::Link(_) | NodeBody::Text(_) | NodeBody::Image(_)
        )
    }

    pub fn is_leaf(&self) -> bool {
        self.children().is_none()
    }
}

/// A node as stored in a snapshot. Ownership is by the tree: the parent
/// reference is a key, never a pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    key: NodeKey,
    parent: Option<NodeKey>,
    body: NodeBody,
}

impl Node {
    pub(crate) fn new(key: NodeKey, body: NodeBody) -> Self {
        Self {
            key,
            parent: None,
            body,
        }
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeKey>) {
        self.parent = parent;
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    pub fn body(&self) -> &NodeBody {
        &self.body
    }

    pub(crate) fn body_mut(&mut self) -> &mut NodeBody {
        &mut self.body
    }

    pub fn children(&self) -> &[NodeKey] {
        self.body.children().unwrap_or(&[])
    }

    pub fn is_container(&self) -> bool {
        self.body.children().is_some()
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match &self.body {
            NodeBody::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&LinkNode> {
        match &self.body {
            NodeBody::Link(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageNode> {
        match &self.body {
            NodeBody::Image(i) => Some(i),
            _ => None,
        }
    }

    pub fn heading_tag(&self) -> Option<HeadingTag> {
        match &self.body {
            NodeBody::Heading(h) => Some(h.tag),
            _ => None,
        }
    }
}
