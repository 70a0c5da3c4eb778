use crate::core::Editor;
use crate::error::EditorError;
use crate::node::{HeadingTag, NodeBody, NodeKey};
use crate::query::{BlockType, current_block_type};
use crate::selection::Selection;
use crate::snapshot::Snapshot;
use crate::transaction::Transaction;

fn selected_blocks(state: &Snapshot) -> Vec<NodeKey> {
    match state.selection() {
        Some(Selection::Range(range)) => state.blocks_in_range(range),
        Some(Selection::Node(nodes)) => {
            let mut blocks: Vec<NodeKey> = nodes
                .keys()
                .filter_map(|key| state.nearest_block(key).map(|n| n.key()))
                .collect();
            blocks.sort();
            blocks.dedup();
            blocks
        }
        None => Vec::new(),
    }
}

/// Converts every selected block to the type `make` builds, keeping children.
fn set_blocks(tx: &mut Transaction<'_>, make: impl Fn() -> NodeBody) -> Result<bool, EditorError> {
    let blocks = selected_blocks(tx.state());
    if blocks.is_empty() {
        return Ok(false);
    }
    for block in blocks {
        let target = make();
        let current = tx.node(block)?.body();
        let same = match (current, &target) {
            (NodeBody::Paragraph(_), NodeBody::Paragraph(_)) => true,
            (NodeBody::Heading(a), NodeBody::Heading(b)) => a.tag == b.tag,
            _ => false,
        };
        if !same {
            tx.replace_container(block, target)?;
        }
    }
    Ok(true)
}

/// Makes the selected blocks `tag` headings, or paragraphs when the anchor
/// block already is one. One update either way.
pub fn toggle_heading(editor: &mut Editor, tag: HeadingTag) -> Result<bool, EditorError> {
    let current = editor.read(current_block_type);
    if current == BlockType::Heading(tag) {
        return set_paragraph(editor);
    }
    editor.update(format!("block:heading:{}", tag.as_str()), |tx| {
        set_blocks(tx, || NodeBody::heading(tag))
    })
}

pub fn set_paragraph(editor: &mut Editor) -> Result<bool, EditorError> {
    editor.update("block:paragraph", |tx| set_blocks(tx, NodeBody::paragraph))
}
