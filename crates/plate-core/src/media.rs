use serde_json::{Map, Value};

use crate::command::{CommandPriority, INSERT_MEDIA, InsertMediaPayload, Registration};
use crate::core::Editor;
use crate::error::{ConfigError, EditorError, SchemaError};
use crate::node::{ImageNode, NodeBody, kind};
use crate::plugin::{
    ChildConstraint, NodeRole, NodeSpec, PlatePlugin, optional_str, required_str,
};
use crate::project::DomElement;
use crate::selection::Selection;

/// Registers the `image` node type.
pub struct ImagePlugin;

impl PlatePlugin for ImagePlugin {
    fn id(&self) -> &'static str {
        "image"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: kind::IMAGE,
            role: NodeRole::Inline,
            is_void: true,
            children: ChildConstraint::None,
            version: 1,
            export_json: image_fields,
            import_json: import_image,
            migrate: migrate_image,
            create_dom: image_dom,
            // Media is opaque: any change recreates the element.
            update_dom: |_, _| false,
            export_dom: export_image_dom,
        }]
    }
}

fn image_fields(body: &NodeBody) -> Map<String, Value> {
    let mut map = Map::new();
    if let NodeBody::Image(image) = body {
        map.insert("src".into(), Value::String(image.src().to_string()));
        map.insert("altText".into(), Value::String(image.alt_text.clone()));
        if let Some(width) = &image.width {
            map.insert("width".into(), Value::String(width.clone()));
        }
        if let Some(height) = &image.height {
            map.insert("height".into(), Value::String(height.clone()));
        }
    }
    map
}

fn import_image(record: &Value) -> Result<NodeBody, SchemaError> {
    let src = required_str(record, kind::IMAGE, "src")?;
    let alt_text = required_str(record, kind::IMAGE, "altText")?;
    let width = optional_str(record, kind::IMAGE, "width")?;
    let height = optional_str(record, kind::IMAGE, "height")?;
    let image = ImageNode::new(src, alt_text).ok_or_else(|| SchemaError::InvalidField {
        kind: kind::IMAGE.to_string(),
        field: "src",
        reason: "image source must not be empty".into(),
    })?;
    Ok(NodeBody::Image(image.with_size(width, height)))
}

/// Version 0 records stored the alt text under `alt`.
fn migrate_image(from: u32, mut record: Value) -> Result<Value, SchemaError> {
    if from == 0 {
        if let Some(map) = record.as_object_mut() {
            if !map.contains_key("altText") {
                if let Some(alt) = map.remove("alt") {
                    map.insert("altText".into(), alt);
                }
            }
            map.insert("version".into(), Value::from(1));
        }
    }
    Ok(record)
}

fn image_dom(body: &NodeBody) -> DomElement {
    let NodeBody::Image(image) = body else {
        return DomElement::new("img");
    };
    let mut style = String::from("max-width: 100%; display: block; margin: 0 auto;");
    if let Some(width) = &image.width {
        style.push_str(&format!(" width: {width};"));
    }
    if let Some(height) = &image.height {
        style.push_str(&format!(" height: {height};"));
    }
    DomElement::new("img")
        .attr("src", image.src())
        .attr("alt", image.alt_text.clone())
        .attr("class", "editor-image")
        .attr("style", style)
}

fn export_image_dom(body: &NodeBody) -> DomElement {
    let NodeBody::Image(image) = body else {
        return DomElement::new("img");
    };
    DomElement::new("img")
        .attr("src", image.src())
        .attr("alt", image.alt_text.clone())
        .attr_opt("width", image.width.as_deref())
        .attr_opt("height", image.height.as_deref())
        .attr("class", "editor-image")
}

/// Wires `insert-media` into an editor that has the `image` type registered.
pub struct MediaPlugin;

impl MediaPlugin {
    pub fn register(editor: &Editor) -> Result<Registration, EditorError> {
        if !editor.has_nodes(&[kind::IMAGE]) {
            return Err(ConfigError::MissingRequiredNode(kind::IMAGE).into());
        }
        Ok(editor.register_command(INSERT_MEDIA, CommandPriority::Editor, insert_media))
    }
}

/// Inserts an image at the caret and selects it, in one update. Declines
/// without a range selection.
pub fn insert_media(editor: &mut Editor, payload: &InsertMediaPayload) -> Result<bool, EditorError> {
    editor.update("command:insert-media", |tx| {
        tx.registry().ensure_registered(kind::IMAGE)?;
        if !matches!(tx.selection(), Some(Selection::Range(_))) {
            tracing::debug!("insert-media declined: no range selection");
            return Ok(false);
        }
        let Some(image) = ImageNode::new(payload.source.clone(), payload.alt_text.clone()) else {
            tracing::warn!("insert-media declined: empty source");
            return Ok(false);
        };

        let key = tx.create_image(image)?;
        tx.insert_inline_at_selection(key)?;
        tx.select_nodes([key]);
        Ok(true)
    })
}
