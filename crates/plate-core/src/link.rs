use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::command::{CommandPriority, Registration, TOGGLE_LINK, ToggleLinkPayload};
use crate::core::Editor;
use crate::error::{EditorError, SchemaError};
use crate::node::{LinkNode, NodeBody, NodeKey, kind};
use crate::plugin::{
    ChildConstraint, NodeRole, NodeSpec, PlatePlugin, no_migration, required_str,
};
use crate::project::DomElement;
use crate::query::enclosing_link;
use crate::transaction::Transaction;

pub struct LinkPlugin;

impl PlatePlugin for LinkPlugin {
    fn id(&self) -> &'static str {
        "link"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: kind::LINK,
            role: NodeRole::Inline,
            is_void: false,
            children: ChildConstraint::InlineOnly,
            version: 1,
            export_json: link_fields,
            import_json: import_link,
            migrate: no_migration,
            create_dom: link_dom,
            update_dom: |prev, next| prev.kind() == next.kind(),
            export_dom: link_dom,
        }]
    }
}

fn link_fields(body: &NodeBody) -> Map<String, Value> {
    let mut map = Map::new();
    if let NodeBody::Link(link) = body {
        map.insert("url".into(), Value::String(link.url().to_string()));
    }
    map
}

fn import_link(record: &Value) -> Result<NodeBody, SchemaError> {
    let url = required_str(record, kind::LINK, "url")?;
    LinkNode::new(url)
        .map(NodeBody::Link)
        .ok_or_else(|| SchemaError::InvalidField {
            kind: kind::LINK.to_string(),
            field: "url",
            reason: "link url must not be empty".into(),
        })
}

fn link_dom(body: &NodeBody) -> DomElement {
    match body {
        NodeBody::Link(link) => DomElement::new("a").attr("href", link.url()),
        _ => DomElement::new("a"),
    }
}

/// Default `toggle-link` behavior. `OpenEditor` is left to whatever link UI
/// is mounted.
pub fn register_link_command(editor: &Editor) -> Registration {
    editor.register_command(TOGGLE_LINK, CommandPriority::Editor, toggle_link)
}

pub fn toggle_link(editor: &mut Editor, payload: &ToggleLinkPayload) -> Result<bool, EditorError> {
    match payload {
        ToggleLinkPayload::OpenEditor => Ok(false),
        ToggleLinkPayload::Remove => editor.update("command:toggle-link:remove", remove_links),
        ToggleLinkPayload::Apply(url) if url.is_empty() => {
            editor.update("command:toggle-link:remove", remove_links)
        }
        ToggleLinkPayload::Apply(url) => {
            editor.update("command:toggle-link:apply", |tx| apply_link(tx, url))
        }
    }
}

fn links_touched(tx: &Transaction<'_>) -> Option<BTreeSet<NodeKey>> {
    let range = tx.state().range_selection()?;
    Some(
        tx.state()
            .touched_nodes(range)
            .into_iter()
            .filter_map(|key| enclosing_link(tx.state(), key))
            .collect(),
    )
}

/// Unwraps every link the selection touches.
fn remove_links(tx: &mut Transaction<'_>) -> Result<bool, EditorError> {
    let Some(links) = links_touched(tx) else {
        return Ok(false);
    };
    let touched = !links.is_empty();
    for link in links {
        tx.unwrap_node(link)?;
    }
    Ok(touched)
}

fn apply_link(tx: &mut Transaction<'_>, url: &str) -> Result<bool, EditorError> {
    let Some(range) = tx.state().range_selection().cloned() else {
        return Ok(false);
    };

    if range.is_collapsed() {
        // A caret can only retarget the link it sits in.
        let Some(links) = links_touched(tx) else {
            return Ok(false);
        };
        if links.is_empty() {
            tracing::warn!("toggle-link with a caret outside any link; nothing to wrap");
            return Ok(false);
        }
        for link in links {
            tx.link_mut(link)?.set_url(url);
        }
        return Ok(true);
    }

    tx.split_selected_text()?;
    let Some(range) = tx.state().range_selection().cloned() else {
        return Ok(false);
    };
    let leaves = tx.state().leaves_in_range(&range);
    if leaves.is_empty() {
        return Ok(false);
    }

    // Leaves already inside a link retarget it; the rest are wrapped in runs
    // of adjacent siblings.
    let mut retarget = BTreeSet::new();
    let mut runs: Vec<Vec<NodeKey>> = Vec::new();
    let mut last: Option<(NodeKey, usize)> = None;
    for key in leaves {
        if let Some(link) = enclosing_link(tx.state(), key) {
            retarget.insert(link);
            last = None;
            continue;
        }
        let node = tx.node(key)?;
        let parent = node.parent().ok_or(EditorError::UnknownNode(key))?;
        let index = tx
            .state()
            .index_in_parent(key)
            .ok_or(EditorError::UnknownNode(key))?;
        match (last, runs.last_mut()) {
            (Some((p, i)), Some(run)) if p == parent && i + 1 == index => run.push(key),
            _ => runs.push(vec![key]),
        }
        last = Some((parent, index));
    }

    for link in retarget {
        tx.link_mut(link)?.set_url(url);
    }
    for run in runs {
        let Some(link) = LinkNode::new(url) else {
            return Ok(false);
        };
        tx.wrap_nodes(&run, NodeBody::Link(link))?;
    }
    Ok(true)
}
