use std::cell::RefCell;
use std::rc::Rc;

use manos_plate_core::{
    CommandPriority, Editor, EditorError, Registrations, SELECTION_CHANGE, TOGGLE_LINK,
    ToggleLinkPayload, link_at_selection,
};

use crate::floating::{AnchorProvider, FloatingPosition};
use crate::link_editor::{
    LinkEditorEffect, LinkEditorEvent, LinkEditorKey, LinkEditorMachine, LinkEditorState,
    SelectionSample,
};

/// Mounts the floating link editor on one editor instance.
///
/// The plugin answers `toggle-link` requests that carry no URL by opening
/// itself, and watches selection changes to follow the caret into and out of
/// links. Timers are driven by [`LinkEditorPlugin::poll`].
pub struct LinkEditorPlugin {
    machine: Rc<RefCell<LinkEditorMachine>>,
    anchors: Rc<dyn AnchorProvider>,
    focus_requested: Rc<RefCell<bool>>,
    registrations: Registrations,
}

impl LinkEditorPlugin {
    pub fn register(editor: &Editor, anchors: Rc<dyn AnchorProvider>) -> Self {
        let machine = Rc::new(RefCell::new(LinkEditorMachine::new()));
        let mut registrations = Registrations::new();

        let open_machine = Rc::clone(&machine);
        let open_anchors = Rc::clone(&anchors);
        registrations.push(editor.register_command(
            TOGGLE_LINK,
            CommandPriority::Low,
            move |editor, payload| {
                if *payload != ToggleLinkPayload::OpenEditor {
                    return Ok(false);
                }
                let sample = sample_selection(editor, open_anchors.as_ref());
                open_machine
                    .borrow_mut()
                    .handle(LinkEditorEvent::OpenRequested(sample), editor.now());
                Ok(true)
            },
        ));

        let watch_machine = Rc::clone(&machine);
        registrations.push(editor.register_command(
            SELECTION_CHANGE,
            CommandPriority::Editor,
            move |editor, _| {
                watch_machine
                    .borrow_mut()
                    .handle(LinkEditorEvent::SelectionChanged, editor.now());
                Ok(false)
            },
        ));

        Self {
            machine,
            anchors,
            focus_requested: Rc::default(),
            registrations,
        }
    }

    pub fn state(&self) -> LinkEditorState {
        self.machine.borrow().state().clone()
    }

    pub fn input(&self) -> String {
        self.machine.borrow().input().to_string()
    }

    /// Where to draw the control, given its measured width.
    pub fn position(&self, popup_width: Option<f32>) -> Option<FloatingPosition> {
        match self.machine.borrow().state() {
            LinkEditorState::Open {
                anchor: Some(anchor),
                ..
            } => Some(FloatingPosition::below(
                *anchor,
                self.anchors.viewport(),
                popup_width,
            )),
            _ => None,
        }
    }

    /// True once after the control asked for input focus.
    pub fn take_focus_request(&self) -> bool {
        std::mem::take(&mut *self.focus_requested.borrow_mut())
    }

    /// Fires due timers against the editor's clock.
    pub fn poll(&self, editor: &mut Editor) -> Result<(), EditorError> {
        let effects = self.machine.borrow_mut().poll(editor.now());
        self.run_effects(editor, effects)
    }

    /// Mirrors the URL field. Ignored while closed.
    pub fn set_input(&self, text: impl Into<String>, editor: &Editor) {
        self.machine
            .borrow_mut()
            .handle(LinkEditorEvent::InputChanged(text.into()), editor.now());
    }

    pub fn submit(&self, editor: &mut Editor) -> Result<(), EditorError> {
        self.send(editor, LinkEditorEvent::Submit)
    }

    pub fn remove(&self, editor: &mut Editor) -> Result<(), EditorError> {
        self.send(editor, LinkEditorEvent::Remove)
    }

    pub fn cancel(&self, editor: &mut Editor) -> Result<(), EditorError> {
        self.send(editor, LinkEditorEvent::Cancel)
    }

    pub fn click_outside(&self, editor: &mut Editor) -> Result<(), EditorError> {
        self.send(editor, LinkEditorEvent::ClickOutside)
    }

    pub fn key(&self, editor: &mut Editor, key: LinkEditorKey) -> Result<(), EditorError> {
        self.send(editor, LinkEditorEvent::Key(key))
    }

    fn send(&self, editor: &mut Editor, event: LinkEditorEvent) -> Result<(), EditorError> {
        let effects = self.machine.borrow_mut().handle(event, editor.now());
        self.run_effects(editor, effects)
    }

    // The machine is not borrowed here: dispatching re-enters the
    // selection handler above.
    fn run_effects(
        &self,
        editor: &mut Editor,
        effects: Vec<LinkEditorEffect>,
    ) -> Result<(), EditorError> {
        for effect in effects {
            match effect {
                LinkEditorEffect::Dispatch(payload) => {
                    editor.dispatch(TOGGLE_LINK, payload)?;
                }
                LinkEditorEffect::SampleSelection => {
                    let sample = sample_selection(editor, self.anchors.as_ref());
                    let more = self
                        .machine
                        .borrow_mut()
                        .handle(LinkEditorEvent::SelectionSettled(sample), editor.now());
                    self.run_effects(editor, more)?;
                }
                LinkEditorEffect::FocusInput => {
                    *self.focus_requested.borrow_mut() = true;
                }
            }
        }
        Ok(())
    }

    pub fn unregister(self) {
        self.registrations.unregister_all();
    }
}

fn sample_selection(editor: &Editor, anchors: &dyn AnchorProvider) -> SelectionSample {
    let anchor = anchors.selection_rect(editor);
    editor.read(|state| {
        let range = state.range_selection();
        SelectionSample {
            is_range: range.is_some(),
            is_collapsed: range.is_some_and(|r| r.is_collapsed()),
            link: link_at_selection(state),
            anchor,
        }
    })
}

/// Applies `url` to the selection. Returns false, sending nothing, for
/// empty input.
pub fn insert_link(editor: &mut Editor, url: &str) -> Result<bool, EditorError> {
    if url.is_empty() {
        return Ok(false);
    }
    editor.dispatch(TOGGLE_LINK, ToggleLinkPayload::Apply(url.to_string()))?;
    Ok(true)
}
