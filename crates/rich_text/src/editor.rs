use std::rc::Rc;

use manos_plate_core::{
    Editor, EditorConfig, EditorError, MediaPlugin, Registration, Registrations, Snapshot,
    UpdateEvent, kind, register_link_command, register_text_format_command,
};

use crate::floating::{AnchorProvider, FixedAnchor};
use crate::link_plugin::LinkEditorPlugin;
use crate::toolbar::ToolbarPlugin;

pub const DEFAULT_PLACEHOLDER: &str = "Enter some text...";

type ChangeCallback = Rc<dyn Fn(&UpdateEvent)>;

/// Which parts of the surface to mount.
#[derive(Clone)]
pub struct RichTextEditorOptions {
    pub show_toolbar: bool,
    pub enable_links: bool,
    pub enable_images: bool,
    pub read_only: bool,
    pub placeholder: String,
    pub on_change: Option<ChangeCallback>,
    /// Geometry source for the floating link editor. Defaults to a
    /// [`FixedAnchor`] with no rectangle.
    pub anchors: Option<Rc<dyn AnchorProvider>>,
}

impl Default for RichTextEditorOptions {
    fn default() -> Self {
        Self {
            show_toolbar: true,
            enable_links: true,
            enable_images: true,
            read_only: false,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            on_change: None,
            anchors: None,
        }
    }
}

impl RichTextEditorOptions {
    pub fn show_toolbar(mut self, show_toolbar: bool) -> Self {
        self.show_toolbar = show_toolbar;
        self
    }

    pub fn enable_links(mut self, enable_links: bool) -> Self {
        self.enable_links = enable_links;
        self
    }

    pub fn enable_images(mut self, enable_images: bool) -> Self {
        self.enable_images = enable_images;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn on_change(mut self, on_change: impl Fn(&UpdateEvent) + 'static) -> Self {
        self.on_change = Some(Rc::new(on_change));
        self
    }

    pub fn anchors(mut self, anchors: Rc<dyn AnchorProvider>) -> Self {
        self.anchors = Some(anchors);
        self
    }
}

/// An editor with the rich-text plugins mounted according to
/// [`RichTextEditorOptions`].
///
/// Interactive plugins (toolbar, link editor) are skipped for read-only
/// editors. Everything registered here is removed again by
/// [`RichTextEditor::teardown`].
pub struct RichTextEditor {
    editor: Editor,
    toolbar: Option<ToolbarPlugin>,
    link_editor: Option<LinkEditorPlugin>,
    media: Option<Registration>,
    core: Registrations,
    placeholder: String,
}

impl RichTextEditor {
    pub fn new(config: EditorConfig, options: RichTextEditorOptions) -> Result<Self, EditorError> {
        let read_only = config.read_only || options.read_only;
        let editor = Editor::new(config.read_only(read_only))?;

        let mut core = Registrations::new();
        core.push(register_text_format_command(&editor));
        core.push(register_link_command(&editor));
        if let Some(on_change) = options.on_change {
            core.push(editor.register_update_listener(move |event| on_change(event)));
        }

        let media = if options.enable_images {
            Some(MediaPlugin::register(&editor)?)
        } else {
            None
        };

        let toolbar = (options.show_toolbar && !read_only).then(|| ToolbarPlugin::register(&editor));

        let link_editor = (options.enable_links && !read_only).then(|| {
            let anchors = options
                .anchors
                .unwrap_or_else(|| Rc::new(FixedAnchor::default()));
            LinkEditorPlugin::register(&editor, anchors)
        });

        tracing::debug!(
            namespace = editor.namespace(),
            read_only,
            toolbar = toolbar.is_some(),
            link_editor = link_editor.is_some(),
            media = media.is_some(),
            "rich text editor mounted"
        );

        Ok(Self {
            editor,
            toolbar,
            link_editor,
            media,
            core,
            placeholder: options.placeholder,
        })
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut Editor {
        &mut self.editor
    }

    pub fn toolbar(&self) -> Option<&ToolbarPlugin> {
        self.toolbar.as_ref()
    }

    /// The toolbar together with the editor it drives.
    pub fn toolbar_mut(&mut self) -> Option<(&mut ToolbarPlugin, &mut Editor)> {
        self.toolbar.as_mut().map(|toolbar| (toolbar, &mut self.editor))
    }

    pub fn link_editor(&self) -> Option<&LinkEditorPlugin> {
        self.link_editor.as_ref()
    }

    pub fn link_editor_mut(&mut self) -> Option<(&LinkEditorPlugin, &mut Editor)> {
        self.link_editor
            .as_ref()
            .map(|link_editor| (link_editor, &mut self.editor))
    }

    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }

    /// The placeholder text, while the document has nothing to show.
    pub fn placeholder(&self) -> Option<&str> {
        self.editor
            .read(is_blank)
            .then_some(self.placeholder.as_str())
    }

    /// Fires the link editor's due timers.
    pub fn poll(&mut self) -> Result<(), EditorError> {
        match &self.link_editor {
            Some(link_editor) => link_editor.poll(&mut self.editor),
            None => Ok(()),
        }
    }

    /// Unregisters every plugin and hands the bare editor back.
    pub fn teardown(self) -> Editor {
        if let Some(toolbar) = self.toolbar {
            toolbar.unregister();
        }
        if let Some(link_editor) = self.link_editor {
            link_editor.unregister();
        }
        if let Some(media) = self.media {
            media.unregister();
        }
        self.core.unregister_all();
        self.editor
    }
}

fn is_blank(state: &Snapshot) -> bool {
    state.document_order().into_iter().all(|key| {
        state.node(key).is_none_or(|node| match node.as_text() {
            Some(text) => text.text.is_empty(),
            None => node.kind() != kind::IMAGE,
        })
    })
}
