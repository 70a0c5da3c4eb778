mod debounce;
mod editor;
mod floating;
mod link_editor;
mod link_plugin;
mod toolbar;

pub use debounce::*;
pub use editor::*;
pub use floating::*;
pub use link_editor::*;
pub use link_plugin::*;
pub use toolbar::*;
