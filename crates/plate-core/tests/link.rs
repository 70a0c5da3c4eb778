use std::cell::Cell;
use std::rc::Rc;

use manos_plate_core::{
    CommandPriority, Editor, EditorConfig, LinkInfo, NodeKey, Point, Selection, TOGGLE_LINK,
    ToggleLinkPayload, kind, link_at_selection, register_link_command, toggle_link,
};
use serde_json::json;

fn editor_with(children: serde_json::Value) -> Editor {
    let doc = json!({ "root": { "type": "root", "version": 1, "children": children } });
    Editor::new(EditorConfig::default().initial_json(doc.to_string())).unwrap()
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

fn paragraph_children(editor: &Editor) -> Vec<serde_json::Value> {
    let root = editor.serialize_node(NodeKey::ROOT).unwrap();
    root["children"][0]["children"].as_array().unwrap().clone()
}

fn linked_paragraph() -> Editor {
    editor_with(json!([
        { "type": "paragraph", "children": [
            { "type": "text", "text": "see " },
            { "type": "link", "url": "https://a.example", "children": [
                { "type": "text", "text": "docs" }
            ]},
            { "type": "text", "text": " here" }
        ]}
    ]))
}

#[test]
fn applying_a_url_wraps_the_selected_text() {
    let mut editor = editor_with(json!([
        { "type": "paragraph", "children": [{ "type": "text", "text": "hello world" }] }
    ]));
    let _links = register_link_command(&editor);
    let text = keys_of(&editor, kind::TEXT)[0];
    editor
        .set_selection(Some(Selection::range(Point::new(text, 0), Point::new(text, 5))))
        .unwrap();
    assert_eq!(
        editor.read(link_at_selection),
        Some(LinkInfo {
            url: String::new(),
            is_existing: false
        })
    );

    editor
        .dispatch(TOGGLE_LINK, ToggleLinkPayload::Apply("https://x.example".into()))
        .unwrap();

    let children = paragraph_children(&editor);
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["type"], json!("link"));
    assert_eq!(children[0]["url"], json!("https://x.example"));
    assert_eq!(children[0]["children"][0]["text"], json!("hello"));
    assert_eq!(children[1]["text"], json!(" world"));

    assert_eq!(
        editor.read(link_at_selection),
        Some(LinkInfo {
            url: "https://x.example".into(),
            is_existing: true
        })
    );
}

#[test]
fn caret_inside_a_link_retargets_it() {
    let mut editor = linked_paragraph();
    let _links = register_link_command(&editor);
    let docs = keys_of(&editor, kind::TEXT)[1];
    editor.set_selection(Some(Selection::caret(docs, 2))).unwrap();

    editor.dispatch(TOGGLE_LINK, ToggleLinkPayload::Apply("https://b.example".into())).unwrap();
    let link = keys_of(&editor, kind::LINK)[0];
    editor.read(|state| {
        assert_eq!(state.node(link).unwrap().as_link().unwrap().url(), "https://b.example");
    });
    assert_eq!(keys_of(&editor, kind::LINK).len(), 1);
}

#[test]
fn caret_outside_any_link_declines() {
    let mut editor = linked_paragraph();
    let _links = register_link_command(&editor);
    let see = keys_of(&editor, kind::TEXT)[0];
    editor.set_selection(Some(Selection::caret(see, 1))).unwrap();

    let before = editor.state();
    editor.dispatch(TOGGLE_LINK, ToggleLinkPayload::Apply("https://b.example".into())).unwrap();
    assert!(Rc::ptr_eq(&before, &editor.state()));
}

#[test]
fn removing_unwraps_the_link_and_keeps_the_text() {
    for payload in [ToggleLinkPayload::Remove, ToggleLinkPayload::Apply(String::new())] {
        let mut editor = linked_paragraph();
        let _links = register_link_command(&editor);
        let docs = keys_of(&editor, kind::TEXT)[1];
        editor.set_selection(Some(Selection::caret(docs, 2))).unwrap();

        editor.dispatch(TOGGLE_LINK, payload).unwrap();
        assert!(keys_of(&editor, kind::LINK).is_empty());
        assert_eq!(editor.read(|s| s.text_content(NodeKey::ROOT)), "see docs here");
        // The caret is still on the same text node.
        assert_eq!(
            editor.selection(),
            Some(&Selection::caret(docs, 2))
        );
        assert_eq!(editor.read(link_at_selection).map(|l| l.is_existing), Some(false));
    }
}

#[test]
fn open_editor_is_left_to_the_link_ui() {
    let mut editor = linked_paragraph();
    let _links = register_link_command(&editor);
    let docs = keys_of(&editor, kind::TEXT)[1];
    editor.set_selection(Some(Selection::caret(docs, 0))).unwrap();
    let before = editor.state();
    assert!(!toggle_link(&mut editor, &ToggleLinkPayload::OpenEditor).unwrap());
    editor.dispatch(TOGGLE_LINK, ToggleLinkPayload::OpenEditor).unwrap();
    assert!(Rc::ptr_eq(&before, &editor.state()));
}

#[test]
fn removing_with_no_link_under_the_caret_passes_the_command_on() {
    let mut editor = linked_paragraph();
    let _links = register_link_command(&editor);
    let fallback_runs = Rc::new(Cell::new(0));
    let runs = Rc::clone(&fallback_runs);
    let _fallback = editor.register_command(TOGGLE_LINK, CommandPriority::Editor, move |_, _| {
        runs.set(runs.get() + 1);
        Ok(true)
    });
    let see = keys_of(&editor, kind::TEXT)[0];
    editor.set_selection(Some(Selection::caret(see, 1))).unwrap();

    let before = editor.state();
    assert!(!toggle_link(&mut editor, &ToggleLinkPayload::Remove).unwrap());
    editor.dispatch(TOGGLE_LINK, ToggleLinkPayload::Remove).unwrap();
    assert_eq!(fallback_runs.get(), 1);
    assert!(Rc::ptr_eq(&before, &editor.state()));

    // Inside the link the default handler claims it.
    let docs = keys_of(&editor, kind::TEXT)[1];
    editor.set_selection(Some(Selection::caret(docs, 1))).unwrap();
    editor.dispatch(TOGGLE_LINK, ToggleLinkPayload::Remove).unwrap();
    assert_eq!(fallback_runs.get(), 1);
    assert!(keys_of(&editor, kind::LINK).is_empty());
}

#[test]
fn empty_links_are_normalized_away() {
    let editor = editor_with(json!([
        { "type": "paragraph", "children": [
            { "type": "text", "text": "a" },
            { "type": "link", "url": "https://a.example", "children": [] }
        ]}
    ]));
    assert!(keys_of(&editor, kind::LINK).is_empty());
    assert_eq!(editor.export_html(), "<p><span>a</span></p>");
}

#[test]
fn link_records_need_a_url() {
    let editor = editor_with(json!([
        { "type": "paragraph", "children": [
            { "type": "link", "children": [{ "type": "text", "text": "x" }] }
        ]}
    ]));
    // Unreadable document: starts empty instead.
    assert!(keys_of(&editor, kind::LINK).is_empty());
    assert_eq!(editor.read(|s| s.text_content(NodeKey::ROOT)), "");
}
