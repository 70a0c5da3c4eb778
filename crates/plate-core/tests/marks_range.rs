use manos_plate_core::{
    Editor, EditorConfig, NodeKey, Point, Selection, TOGGLE_TEXT_FORMAT, TextFormat,
    TextFormatType, active_text_formats, has_text_format, kind, register_text_format_command,
    toggle_text_format,
};
use serde_json::json;

fn editor_with(children: serde_json::Value) -> Editor {
    let doc = json!({ "root": { "type": "root", "version": 1, "children": children } });
    Editor::new(EditorConfig::default().initial_json(doc.to_string())).unwrap()
}

fn texts(editor: &Editor) -> Vec<NodeKey> {
    editor.read(|state| {
        state
            .document_order()
            .into_iter()
            .filter(|key| state.node(*key).unwrap().kind() == kind::TEXT)
            .collect()
    })
}

/// Per-character formats, independent of how text is split into nodes.
fn char_formats(editor: &Editor) -> Vec<(char, TextFormat)> {
    let keys = texts(editor);
    editor.read(|state| {
        keys.iter()
            .flat_map(|key| {
                let text = state.node(*key).unwrap().as_text().unwrap().clone();
                text.text
                    .chars()
                    .map(move |ch| (ch, text.format))
                    .collect::<Vec<_>>()
            })
            .collect()
    })
}

fn mixed_paragraph() -> Editor {
    editor_with(json!([
        { "type": "paragraph", "children": [
            { "type": "text", "text": "abc", "format": 1 },
            { "type": "text", "text": "def", "format": 2 },
            { "type": "text", "text": "ghi" }
        ]}
    ]))
}

#[test]
fn toggling_twice_restores_every_character() {
    for format in TextFormatType::ALL {
        let mut editor = mixed_paragraph();
        let keys = texts(&editor);
        editor
            .set_selection(Some(Selection::range(
                Point::new(keys[0], 1),
                Point::new(keys[2], 2),
            )))
            .unwrap();
        let before = char_formats(&editor);

        assert!(toggle_text_format(&mut editor, format).unwrap());
        assert_ne!(char_formats(&editor), before);
        assert!(toggle_text_format(&mut editor, format).unwrap());
        assert_eq!(char_formats(&editor), before, "{format:?}");
    }
}

#[test]
fn toggling_a_backward_selection_touches_the_same_characters() {
    let mut editor = mixed_paragraph();
    let keys = texts(&editor);
    editor
        .set_selection(Some(Selection::range(
            Point::new(keys[1], 2),
            Point::new(keys[0], 2),
        )))
        .unwrap();
    toggle_text_format(&mut editor, TextFormatType::Underline).unwrap();

    let underlined: String = char_formats(&editor)
        .into_iter()
        .filter(|(_, f)| f.contains(TextFormat::UNDERLINE))
        .map(|(ch, _)| ch)
        .collect();
    assert_eq!(underlined, "cde");
    assert!(editor.read(|s| s.is_backward(s.range_selection().unwrap())));
}

#[test]
fn active_formats_are_shared_by_every_covered_node() {
    let mut editor = editor_with(json!([
        { "type": "paragraph", "children": [
            { "type": "text", "text": "ab", "format": 3 },
            { "type": "text", "text": "cd", "format": 1 }
        ]}
    ]));
    let keys = texts(&editor);
    editor
        .set_selection(Some(Selection::range(
            Point::new(keys[0], 0),
            Point::new(keys[1], 2),
        )))
        .unwrap();
    editor.read(|state| {
        assert_eq!(active_text_formats(state), TextFormat::BOLD);
        assert!(has_text_format(state, TextFormatType::Bold));
        assert!(!has_text_format(state, TextFormatType::Italic));
    });

    editor
        .set_selection(Some(Selection::range(
            Point::new(keys[0], 0),
            Point::new(keys[0], 2),
        )))
        .unwrap();
    editor.read(|state| {
        assert!(has_text_format(state, TextFormatType::Italic));
    });
}

#[test]
fn caret_toggle_sets_the_pending_format_for_typed_text() {
    let mut editor = editor_with(json!([
        { "type": "paragraph", "children": [{ "type": "text", "text": "ab" }] }
    ]));
    let _formats = register_text_format_command(&editor);
    let text = texts(&editor)[0];
    editor.set_selection(Some(Selection::caret(text, 1))).unwrap();

    editor.dispatch(TOGGLE_TEXT_FORMAT, TextFormatType::Bold).unwrap();
    assert!(editor.read(|s| has_text_format(s, TextFormatType::Bold)));
    // Nothing in the document changed yet.
    assert!(char_formats(&editor).iter().all(|(_, f)| f.is_empty()));

    editor.update("typing", |tx| tx.insert_text("X")).unwrap();
    let bold: String = char_formats(&editor)
        .into_iter()
        .filter(|(_, f)| f.contains(TextFormat::BOLD))
        .map(|(ch, _)| ch)
        .collect();
    assert_eq!(bold, "X");
    assert_eq!(editor.read(|s| s.text_content(NodeKey::ROOT)), "aXb");
}

#[test]
fn toggling_without_a_selection_is_declined() {
    let mut editor = mixed_paragraph();
    let _formats = register_text_format_command(&editor);
    editor.set_selection(None).unwrap();
    let before = editor.state();
    editor.dispatch(TOGGLE_TEXT_FORMAT, TextFormatType::Bold).unwrap();
    assert!(std::rc::Rc::ptr_eq(&before, &editor.state()));
}
