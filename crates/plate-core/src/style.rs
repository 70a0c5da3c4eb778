//! Inline `property: value;` style strings on text nodes.

use crate::core::Editor;
use crate::error::EditorError;
use crate::node::Node;

pub const COLOR: &str = "color";
pub const FONT_SIZE: &str = "font-size";

/// Declarations in source order, one entry per property (last writer wins).
pub fn parse_style(style: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for decl in style.split(';') {
        let Some((name, value)) = decl.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        if name.is_empty() || value.is_empty() {
            continue;
        }
        match out.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value.to_string(),
            None => out.push((name, value.to_string())),
        }
    }
    out
}

pub fn style_property(style: &str, property: &str) -> Option<String> {
    parse_style(style)
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(property))
        .map(|(_, value)| value)
}

/// Sets (or with `None` removes) one property, keeping every other
/// declaration and its position.
pub fn patch_style(style: &str, property: &str, value: Option<&str>) -> String {
    let property = property.trim().to_ascii_lowercase();
    let mut decls = parse_style(style);
    match (decls.iter().position(|(n, _)| *n == property), value) {
        (Some(ix), Some(value)) => decls[ix].1 = value.to_string(),
        (Some(ix), None) => {
            decls.remove(ix);
        }
        (None, Some(value)) => decls.push((property, value.to_string())),
        (None, None) => {}
    }
    decls
        .iter()
        .map(|(name, value)| format!("{name}: {value};"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Patches `property` on every text node in the selection, splitting text at
/// the range edges. A caret patches the text node it sits in. Text inside a
/// link is treated like any other text; the link itself is not touched.
pub fn patch_selection_style(
    editor: &mut Editor,
    property: &str,
    value: Option<&str>,
) -> Result<bool, EditorError> {
    editor.update(format!("style:{property}"), |tx| {
        let Some(range) = tx.state().range_selection().cloned() else {
            return Ok(false);
        };
        let targets = if range.is_collapsed() {
            tx.state()
                .node(range.anchor.key)
                .and_then(Node::as_text)
                .map(|_| vec![range.anchor.key])
                .unwrap_or_default()
        } else {
            tx.split_selected_text()?
        };
        if targets.is_empty() {
            return Ok(false);
        }
        for key in targets {
            let text = tx.text_mut(key)?;
            text.style = patch_style(&text.style, property, value);
        }
        Ok(true)
    })
}
