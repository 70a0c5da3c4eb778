use crate::command::{CommandPriority, Registration, TOGGLE_TEXT_FORMAT};
use crate::core::Editor;
use crate::error::EditorError;
use crate::node::TextFormatType;

/// Default `toggle-text-format` behavior.
pub fn register_text_format_command(editor: &Editor) -> Registration {
    editor.register_command(TOGGLE_TEXT_FORMAT, CommandPriority::Editor, |editor, format| {
        toggle_text_format(editor, *format)
    })
}

/// Flips `format` on every text node inside the selection, splitting text at
/// the range edges first. A caret flips its pending format instead. Each node
/// is flipped on its own, so two toggles always restore the prior state.
pub fn toggle_text_format(editor: &mut Editor, format: TextFormatType) -> Result<bool, EditorError> {
    let flag = format.flag();
    editor.update(format!("command:toggle-text-format:{}", format.as_str()), |tx| {
        let Some(range) = tx.state().range_selection().cloned() else {
            tracing::trace!("toggle-text-format without a range selection");
            return Ok(false);
        };
        if range.is_collapsed() {
            tx.set_pending_format(range.format ^ flag);
            return Ok(true);
        }

        let covered = tx.split_selected_text()?;
        if covered.is_empty() {
            return Ok(false);
        }
        for key in &covered {
            tx.text_mut(*key)?.format.toggle(flag);
        }
        tx.set_pending_format(range.format ^ flag);
        Ok(true)
    })
}
