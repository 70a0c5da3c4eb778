use std::cell::RefCell;
use std::rc::Rc;

use manos_plate_core::{
    CommandPriority, ConfigError, Editor, EditorConfig, EditorError, HeadingPlugin,
    INSERT_MEDIA, InsertMediaPayload, LinkPlugin, MediaPlugin, NodeKey, NodeRegistry,
    ProjectionChange, Selection, diff_projection, insert_media, kind,
};
use serde_json::json;

fn doc(children: serde_json::Value) -> String {
    json!({ "root": { "type": "root", "version": 1, "children": children } }).to_string()
}

fn editor_with(children: serde_json::Value) -> Editor {
    Editor::new(EditorConfig::default().initial_json(doc(children))).unwrap()
}

fn keys_of(editor: &Editor, wanted: &str) -> Vec<NodeKey> {
    editor.read(|state| {
        state
            .document_order()
            .into_iter()
            .filter(|key| state.node(*key).unwrap().kind() == wanted)
            .collect()
    })
}

fn registry_without_image() -> NodeRegistry {
    let mut registry = NodeRegistry::core();
    registry.register_plugin(Box::new(HeadingPlugin)).unwrap();
    registry.register_plugin(Box::new(LinkPlugin)).unwrap();
    registry
}

#[test]
fn image_records_round_trip_through_a_new_editor() {
    let source = editor_with(json!([
        { "type": "paragraph", "children": [
            { "type": "image", "version": 1, "src": "a.png", "altText": "first" },
            { "type": "image", "version": 1, "src": "b.png", "altText": "", "width": "120px", "height": "80px" },
            { "type": "image", "version": 1, "src": "c.png", "altText": "only width", "width": "50%" }
        ]}
    ]));
    let reloaded = Editor::new(
        EditorConfig::default().initial_json(source.to_json_pretty().unwrap()),
    )
    .unwrap();

    let before: Vec<_> = keys_of(&source, kind::IMAGE)
        .into_iter()
        .map(|key| source.serialize_node(key).unwrap())
        .collect();
    let after: Vec<_> = keys_of(&reloaded, kind::IMAGE)
        .into_iter()
        .map(|key| reloaded.serialize_node(key).unwrap())
        .collect();

    assert_eq!(before.len(), 3);
    assert_eq!(before, after);
    assert_eq!(before[0].get("width"), None);
    assert_eq!(before[1]["height"], json!("80px"));
    assert_eq!(before[2]["width"], json!("50%"));
    assert_eq!(before[2].get("height"), None);
}

#[test]
fn version_zero_images_migrate_alt_to_alt_text() {
    let editor = editor_with(json!([
        { "type": "paragraph", "children": [
            { "type": "image", "src": "legacy.png", "alt": "old caption" }
        ]}
    ]));
    let image = keys_of(&editor, kind::IMAGE)[0];
    let record = editor.serialize_node(image).unwrap();
    assert_eq!(record["altText"], json!("old caption"));
    assert_eq!(record["version"], json!(1));
    assert_eq!(record.get("alt"), None);
}

#[test]
fn malformed_image_records_fall_back_to_an_empty_document() {
    for bad in [
        json!({ "type": "image", "version": 1, "altText": "no source" }),
        json!({ "type": "image", "version": 1, "src": "a.png" }),
        json!({ "type": "image", "version": 1, "src": "", "altText": "" }),
        json!({ "type": "image", "version": 9, "src": "a.png", "altText": "" }),
        json!({ "type": "video", "src": "a.mp4" }),
        // Unversioned records still need alt text under one of its names.
        json!({ "type": "image", "src": "a.png" }),
        json!({ "type": "image", "version": 0, "src": "a.png" }),
    ] {
        let editor = editor_with(json!([{ "type": "paragraph", "children": [bad] }]));
        assert!(keys_of(&editor, kind::IMAGE).is_empty());
        editor.read(|state| {
            assert_eq!(state.root().children().len(), 1);
            assert_eq!(state.text_content(NodeKey::ROOT), "");
        });
    }
}

#[test]
fn loading_an_image_without_the_type_registered_is_a_config_error() {
    let err = Editor::new(
        EditorConfig::default()
            .nodes(registry_without_image())
            .initial_json(doc(json!([
                { "type": "paragraph", "children": [
                    { "type": "image", "version": 1, "src": "a.png", "altText": "" }
                ]}
            ]))),
    )
    .err()
    .unwrap();
    assert!(err.is_config());
}

#[test]
fn media_plugin_refuses_to_mount_without_image_type() {
    let editor = Editor::new(EditorConfig::default().nodes(registry_without_image())).unwrap();
    let err = MediaPlugin::register(&editor).err().unwrap();
    assert!(matches!(
        err,
        EditorError::Config(ConfigError::MissingRequiredNode("image"))
    ));
    assert_eq!(editor.handler_count(INSERT_MEDIA), 0);
}

#[test]
fn insert_media_without_image_type_fails_before_mutating() {
    let mut editor = editor_with_registry_and_text(registry_without_image(), "hello");
    let _media = editor.register_command(INSERT_MEDIA, CommandPriority::Editor, insert_media);

    let text = keys_of(&editor, kind::TEXT)[0];
    editor.set_selection(Some(Selection::caret(text, 2))).unwrap();
    let before = editor.state();

    let err = editor
        .dispatch(INSERT_MEDIA, InsertMediaPayload::new("a.png", "A"))
        .unwrap_err();
    assert!(matches!(
        err,
        EditorError::Config(ConfigError::UnregisteredNode(ref k)) if k == "image"
    ));
    assert!(Rc::ptr_eq(&before, &editor.state()));

    // Same outcome with no selection at all.
    editor.set_selection(None).unwrap();
    let err = editor
        .dispatch(INSERT_MEDIA, InsertMediaPayload::new("a.png", "A"))
        .unwrap_err();
    assert!(err.is_config());
}

fn editor_with_registry_and_text(registry: NodeRegistry, text: &str) -> Editor {
    Editor::new(EditorConfig::default().nodes(registry).initial_json(doc(json!([
        { "type": "paragraph", "children": [{ "type": "text", "text": text }] }
    ]))))
    .unwrap()
}

#[test]
fn insert_media_splits_text_and_selects_the_image() {
    let mut editor = editor_with(json!([
        { "type": "paragraph", "children": [{ "type": "text", "text": "hello" }] }
    ]));
    let _media = MediaPlugin::register(&editor).unwrap();

    let updates = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&updates);
    let _listener = editor.register_update_listener(move |_| *counter.borrow_mut() += 1);

    let text = keys_of(&editor, kind::TEXT)[0];
    editor.set_selection(Some(Selection::caret(text, 2))).unwrap();
    *updates.borrow_mut() = 0;

    editor
        .dispatch(INSERT_MEDIA, InsertMediaPayload::new("cat.png", "A cat"))
        .unwrap();
    assert_eq!(*updates.borrow(), 1);

    let image = keys_of(&editor, kind::IMAGE)[0];
    let paragraph = editor.serialize_node(editor.read(|s| s.root().children()[0])).unwrap();
    let children = paragraph["children"].as_array().unwrap();
    assert_eq!(children.len(), 3);
    assert_eq!(children[0]["text"], json!("he"));
    assert_eq!(children[1]["type"], json!("image"));
    assert_eq!(children[1]["src"], json!("cat.png"));
    assert_eq!(children[1]["altText"], json!("A cat"));
    assert_eq!(children[2]["text"], json!("llo"));

    match editor.selection() {
        Some(Selection::Node(nodes)) => {
            assert!(nodes.contains(image));
            assert_eq!(nodes.keys().count(), 1);
        }
        other => panic!("expected a node selection, got {other:?}"),
    }
}

#[test]
fn declined_insertions_leave_the_snapshot_untouched() {
    let mut editor = editor_with(json!([
        { "type": "paragraph", "children": [{ "type": "text", "text": "hello" }] }
    ]));
    let _media = MediaPlugin::register(&editor).unwrap();

    editor.set_selection(None).unwrap();
    let before = editor.state();
    let json_before = editor.to_json_pretty().unwrap();
    editor.dispatch(INSERT_MEDIA, InsertMediaPayload::new("a.png", "A")).unwrap();
    assert!(Rc::ptr_eq(&before, &editor.state()));

    let text = keys_of(&editor, kind::TEXT)[0];
    editor.set_selection(Some(Selection::caret(text, 1))).unwrap();
    let before = editor.state();
    editor.dispatch(INSERT_MEDIA, InsertMediaPayload::new("", "empty")).unwrap();
    assert!(Rc::ptr_eq(&before, &editor.state()));
    assert_eq!(editor.to_json_pretty().unwrap(), json_before);
}

#[test]
fn image_html_export_and_projection() {
    let mut editor = editor_with(json!([
        { "type": "paragraph", "children": [
            { "type": "text", "text": "x" },
            { "type": "image", "version": 1, "src": "a.png", "altText": "A", "width": "10", "height": "20" }
        ]}
    ]));
    assert_eq!(
        editor.export_html(),
        "<p><span>x</span><img alt=\"A\" class=\"editor-image\" height=\"20\" src=\"a.png\" width=\"10\"></p>"
    );

    let live = editor.project().unwrap().to_html();
    assert!(live.contains("max-width: 100%; display: block; margin: 0 auto;"));

    let image = keys_of(&editor, kind::IMAGE)[0];
    let text = keys_of(&editor, kind::TEXT)[0];
    let before = editor.state();
    editor
        .update("test", |tx| {
            tx.image_mut(image)?.alt_text = "B".into();
            tx.text_mut(text)?.text.push('y');
            Ok(())
        })
        .unwrap();
    let changes = diff_projection(&before, &editor.state(), editor.registry());
    assert_eq!(changes.get(&image), Some(&ProjectionChange::Replaced));
    assert_eq!(changes.get(&text), Some(&ProjectionChange::Patched));
}
