mod blocks;
mod clock;
mod command;
mod core;
mod error;
mod link;
mod marks;
mod media;
mod node;
mod plugin;
mod project;
mod query;
mod selection;
mod serde_value;
mod snapshot;
pub mod style;
mod transaction;

pub use crate::blocks::*;
pub use crate::clock::*;
pub use crate::command::*;
pub use crate::core::*;
pub use crate::error::*;
pub use crate::link::*;
pub use crate::marks::*;
pub use crate::media::*;
pub use crate::node::*;
pub use crate::plugin::*;
pub use crate::project::*;
pub use crate::query::*;
pub use crate::selection::*;
pub use crate::serde_value::*;
pub use crate::snapshot::*;
pub use crate::transaction::*;
