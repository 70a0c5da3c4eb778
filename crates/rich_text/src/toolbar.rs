use std::cell::RefCell;
use std::rc::Rc;

use manos_plate_core::style::{self, COLOR, FONT_SIZE};
use manos_plate_core::{
    BlockType, CommandPriority, Editor, EditorError, HeadingTag, INSERT_MEDIA, InsertMediaPayload,
    Node, Registrations, SELECTION_CHANGE, Snapshot, TOGGLE_LINK, TOGGLE_TEXT_FORMAT,
    TextFormatType, ToggleLinkPayload, active_text_formats, current_block_type, toggle_heading,
};
use serde::Serialize;

use crate::link_editor::normalize_url;

pub const DEFAULT_COLOR: &str = "#000000";
pub const DEFAULT_FONT_SIZE: &str = "15px";
pub const FONT_SIZE_OPTIONS: [&str; 8] = [
    "12px", "13px", "15px", "17px", "19px", "22px", "24px", "28px",
];
/// Alt text used when the image dialog is confirmed without one.
pub const DEFAULT_IMAGE_ALT: &str = "Image";

/// What the toolbar shows as active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolbarState {
    pub is_bold: bool,
    pub is_italic: bool,
    pub is_underline: bool,
    pub is_strikethrough: bool,
    pub block_type: BlockType,
    pub selected_color: String,
    pub selected_font_size: String,
}

impl Default for ToolbarState {
    fn default() -> Self {
        Self {
            is_bold: false,
            is_italic: false,
            is_underline: false,
            is_strikethrough: false,
            block_type: BlockType::Paragraph,
            selected_color: DEFAULT_COLOR.to_string(),
            selected_font_size: DEFAULT_FONT_SIZE.to_string(),
        }
    }
}

impl ToolbarState {
    /// Recomputes everything from `state`. Without a range selection the
    /// previous values are kept.
    pub fn refresh(&mut self, state: &Snapshot) {
        let Some(range) = state.range_selection() else {
            return;
        };
        let formats = active_text_formats(state);
        self.is_bold = formats.contains(TextFormatType::Bold.flag());
        self.is_italic = formats.contains(TextFormatType::Italic.flag());
        self.is_underline = formats.contains(TextFormatType::Underline.flag());
        self.is_strikethrough = formats.contains(TextFormatType::Strikethrough.flag());
        self.block_type = current_block_type(state);

        let anchor_style = state
            .node(range.anchor.key)
            .and_then(Node::as_text)
            .map(|text| text.style.as_str())
            .unwrap_or_default();
        self.selected_color = style::style_property(anchor_style, COLOR)
            .unwrap_or_else(|| DEFAULT_COLOR.to_string());
        self.selected_font_size = style::style_property(anchor_style, FONT_SIZE)
            .unwrap_or_else(|| DEFAULT_FONT_SIZE.to_string());
    }

    pub fn is_active(&self, format: TextFormatType) -> bool {
        match format {
            TextFormatType::Bold => self.is_bold,
            TextFormatType::Italic => self.is_italic,
            TextFormatType::Underline => self.is_underline,
            TextFormatType::Strikethrough => self.is_strikethrough,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDialog {
    pub open: bool,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDialog {
    pub open: bool,
    pub url: String,
    pub alt: String,
}

/// Formatting controls bound to one editor.
pub struct ToolbarPlugin {
    state: Rc<RefCell<ToolbarState>>,
    link_dialog: LinkDialog,
    image_dialog: ImageDialog,
    registrations: Registrations,
}

impl ToolbarPlugin {
    pub fn register(editor: &Editor) -> Self {
        let state = Rc::new(RefCell::new(ToolbarState::default()));
        state.borrow_mut().refresh(&editor.state());

        let mut registrations = Registrations::new();
        // Commits and selection changes share one refresh routine.
        let on_update = Rc::clone(&state);
        registrations.push(editor.register_update_listener(move |event| {
            on_update.borrow_mut().refresh(&event.next);
        }));
        let on_selection = Rc::clone(&state);
        registrations.push(editor.register_command(
            SELECTION_CHANGE,
            CommandPriority::Normal,
            move |editor, _| {
                on_selection.borrow_mut().refresh(&editor.state());
                Ok(false)
            },
        ));

        Self {
            state,
            link_dialog: LinkDialog::default(),
            image_dialog: ImageDialog::default(),
            registrations,
        }
    }

    pub fn state(&self) -> ToolbarState {
        self.state.borrow().clone()
    }

    pub fn toggle_format(
        &self,
        editor: &mut Editor,
        format: TextFormatType,
    ) -> Result<(), EditorError> {
        editor.dispatch(TOGGLE_TEXT_FORMAT, format)?;
        Ok(())
    }

    /// Toggles between `tag` and a plain paragraph for the selected blocks.
    pub fn format_heading(&self, editor: &mut Editor, tag: HeadingTag) -> Result<(), EditorError> {
        if editor.is_read_only() {
            return Err(EditorError::ReadOnly);
        }
        toggle_heading(editor, tag)?;
        Ok(())
    }

    pub fn set_text_color(&self, editor: &mut Editor, color: &str) -> Result<(), EditorError> {
        self.set_style(editor, COLOR, color)?;
        self.state.borrow_mut().selected_color = color.to_string();
        Ok(())
    }

    pub fn set_font_size(&self, editor: &mut Editor, size: &str) -> Result<(), EditorError> {
        if !FONT_SIZE_OPTIONS.contains(&size) {
            tracing::debug!(size, "font size outside the preset list");
        }
        self.set_style(editor, FONT_SIZE, size)?;
        self.state.borrow_mut().selected_font_size = size.to_string();
        Ok(())
    }

    fn set_style(&self, editor: &mut Editor, property: &str, value: &str) -> Result<(), EditorError> {
        if editor.is_read_only() {
            return Err(EditorError::ReadOnly);
        }
        style::patch_selection_style(editor, property, Some(value))?;
        Ok(())
    }

    pub fn link_dialog(&self) -> &LinkDialog {
        &self.link_dialog
    }

    pub fn open_link_dialog(&mut self) {
        self.link_dialog.open = true;
    }

    pub fn set_link_url(&mut self, url: impl Into<String>) {
        self.link_dialog.url = url.into();
    }

    pub fn cancel_link_dialog(&mut self) {
        self.link_dialog = LinkDialog::default();
    }

    /// Links the selection to the typed URL and reports whether a request
    /// went out. An empty URL leaves the dialog as it is.
    pub fn confirm_link(&mut self, editor: &mut Editor) -> Result<bool, EditorError> {
        let Some(url) = normalize_url(&self.link_dialog.url) else {
            return Ok(false);
        };
        editor.dispatch(TOGGLE_LINK, ToggleLinkPayload::Apply(url))?;
        self.link_dialog = LinkDialog::default();
        Ok(true)
    }

    pub fn image_dialog(&self) -> &ImageDialog {
        &self.image_dialog
    }

    pub fn open_image_dialog(&mut self) {
        self.image_dialog.open = true;
    }

    pub fn set_image_url(&mut self, url: impl Into<String>) {
        self.image_dialog.url = url.into();
    }

    pub fn set_image_alt(&mut self, alt: impl Into<String>) {
        self.image_dialog.alt = alt.into();
    }

    pub fn cancel_image_dialog(&mut self) {
        self.image_dialog = ImageDialog::default();
    }

    pub fn confirm_image(&mut self, editor: &mut Editor) -> Result<bool, EditorError> {
        if self.image_dialog.url.is_empty() {
            return Ok(false);
        }
        let alt = if self.image_dialog.alt.is_empty() {
            DEFAULT_IMAGE_ALT
        } else {
            self.image_dialog.alt.as_str()
        };
        let payload = InsertMediaPayload::new(self.image_dialog.url.clone(), alt);
        editor.dispatch(INSERT_MEDIA, payload)?;
        self.image_dialog = ImageDialog::default();
        Ok(true)
    }

    pub fn unregister(self) {
        self.registrations.unregister_all();
    }
}
