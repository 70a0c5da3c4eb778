use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context as _;
use manos_plate_core::{
    ConfigError, Editor, EditorConfig, EditorError, HeadingPlugin, Node, NodeKey, NodeRegistry,
    NormalizePass, PlatePlugin, PlateValue, TextNode, Transaction, kind,
};
use serde_json::json;

fn sample_doc() -> serde_json::Value {
    json!({
        "schema": "manos-plate",
        "version": 1,
        "root": { "type": "root", "version": 1, "children": [
            { "type": "heading", "version": 1, "tag": "h1", "children": [
                { "type": "text", "version": 1, "text": "Title", "format": 0, "style": "" }
            ]},
            { "type": "paragraph", "version": 1, "children": [
                { "type": "text", "version": 1, "text": "Some ", "format": 0, "style": "" },
                { "type": "text", "version": 1, "text": "bold", "format": 1, "style": "color: #ff0000;" },
                { "type": "link", "version": 1, "url": "https://a.example", "children": [
                    { "type": "text", "version": 1, "text": "link", "format": 0, "style": "" }
                ]},
                { "type": "image", "version": 1, "src": "a.png", "altText": "A" }
            ]}
        ]}
    })
}

#[test]
fn documents_survive_a_save_and_load() -> anyhow::Result<()> {
    let editor = Editor::new(EditorConfig::default().initial_json(sample_doc().to_string()))?;
    let saved: serde_json::Value = serde_json::from_str(&editor.to_json_pretty()?)
        .context("saved document is not JSON")?;
    assert_eq!(saved, sample_doc());

    let value = editor.to_value()?;
    assert_eq!(value.schema, "manos-plate");
    assert_eq!(value.version, 1);
    Ok(())
}

#[test]
fn unreadable_initial_state_starts_empty_without_faulting() {
    let faults = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&faults);
    for json in [
        "not json at all".to_string(),
        json!({ "version": 2, "root": { "type": "root" } }).to_string(),
        json!({ "root": { "type": "paragraph" } }).to_string(),
        json!({ "root": { "type": "root", "children": [{ "type": "mystery" }] } }).to_string(),
        json!({ "root": { "type": "root", "children": [{ "text": "no type" }] } }).to_string(),
    ] {
        let sink = Rc::clone(&sink);
        let editor = Editor::new(
            EditorConfig::default()
                .initial_json(json)
                .on_error(move |_| *sink.borrow_mut() += 1),
        )
        .unwrap();
        editor.read(|state| {
            assert_eq!(state.root().children().len(), 1);
            let block = state.node(state.root().children()[0]).unwrap();
            assert_eq!(block.kind(), kind::PARAGRAPH);
        });
    }
    assert_eq!(*faults.borrow(), 0);
}

#[test]
fn missing_required_node_types_are_fatal() {
    let err = Editor::new(EditorConfig::default().nodes(NodeRegistry::default()))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        EditorError::Config(ConfigError::MissingRequiredNode(_))
    ));
}

#[test]
fn registering_a_kind_twice_is_rejected() {
    let mut registry = NodeRegistry::richtext();
    assert_eq!(
        registry.register_plugin(Box::new(HeadingPlugin)),
        Err(ConfigError::DuplicateNode("heading".into()))
    );
}

#[test]
fn initial_state_can_be_built_in_code() {
    let editor = Editor::new(EditorConfig::default().initial_with(|tx| {
        let paragraph = tx.create_paragraph()?;
        let text = tx.create_text(TextNode::new("from code"))?;
        tx.append_child(paragraph, text)?;
        tx.append_child(NodeKey::ROOT, paragraph)?;
        Ok(())
    }))
    .unwrap();
    assert_eq!(editor.read(|s| s.text_content(NodeKey::ROOT)), "from code");
    assert_eq!(editor.export_html(), "<p><span>from code</span></p>");
}

#[test]
fn envelope_parses_on_its_own() {
    let value = PlateValue::from_json_str(&sample_doc().to_string()).unwrap();
    assert_eq!(value.root["children"].as_array().unwrap().len(), 2);
    assert!(PlateValue::from_json_str("{}").is_err());
}

/// Appends to any text reading "loop" forever.
struct RunawayPass;

impl NormalizePass for RunawayPass {
    fn id(&self) -> &'static str {
        "test.runaway"
    }

    fn run(&self, tx: &mut Transaction<'_>) -> Result<bool, EditorError> {
        let looping: Vec<NodeKey> = tx
            .state()
            .document_order()
            .into_iter()
            .filter(|key| {
                tx.state()
                    .node(*key)
                    .and_then(Node::as_text)
                    .is_some_and(|t| t.text.starts_with("loop"))
            })
            .collect();
        for key in &looping {
            tx.text_mut(*key)?.text.push('!');
        }
        Ok(!looping.is_empty())
    }
}

struct RunawayPlugin;

impl PlatePlugin for RunawayPlugin {
    fn id(&self) -> &'static str {
        "test.runaway"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(RunawayPass)]
    }
}

#[test]
fn normalization_that_never_settles_is_reported_and_discarded() {
    let mut registry = NodeRegistry::richtext();
    registry.register_plugin(Box::new(RunawayPlugin)).unwrap();

    let faults = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&faults);
    let mut config = EditorConfig::default()
        .nodes(registry)
        .on_error(move |err| sink.borrow_mut().push(err.to_string()));
    config.max_normalize_iterations = 5;
    let mut editor = Editor::new(config).unwrap();

    let before = editor.state();
    let err = editor
        .update("typing", |tx| {
            let paragraph = tx.state().root().children()[0];
            let text = tx.create_text(TextNode::new("loop"))?;
            tx.append_child(paragraph, text)
        })
        .unwrap_err();
    assert!(matches!(err, EditorError::EngineFault(_)));
    assert_eq!(faults.borrow().len(), 1);
    assert!(Rc::ptr_eq(&before, &editor.state()));
}

#[test]
fn faults_inside_an_update_body_reach_the_host() {
    let faults = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&faults);
    let mut editor = Editor::new(
        EditorConfig::default().on_error(move |err| sink.borrow_mut().push(err.to_string())),
    )
    .unwrap();

    let before = editor.state();
    let err = editor
        .update("delete-all", |tx| tx.remove_node(NodeKey::ROOT))
        .unwrap_err();
    assert!(matches!(err, EditorError::EngineFault(_)));
    assert_eq!(faults.borrow().len(), 1);
    assert!(Rc::ptr_eq(&before, &editor.state()));
}
