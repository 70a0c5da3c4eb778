use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::core::Editor;
use crate::error::EditorError;
use crate::node::{NodeKey, TextFormatType};
use crate::snapshot::Snapshot;

/// Handler ordering, highest first. `Editor` is the default behavior that
/// any feature can override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandPriority {
    Editor,
    Low,
    Normal,
    High,
    Critical,
}

/// A named channel carrying payloads of type `P`.
pub struct Command<P: 'static> {
    name: &'static str,
    _payload: PhantomData<fn(&P)>,
}

impl<P: 'static> Command<P> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _payload: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<P> Clone for Command<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Command<P> {}

impl<P> fmt::Debug for Command<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Command").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertMediaPayload {
    pub source: String,
    pub alt_text: String,
}

impl InsertMediaPayload {
    pub fn new(source: impl Into<String>, alt_text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            alt_text: alt_text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleLinkPayload {
    /// No URL: ask whichever link UI is mounted to open.
    OpenEditor,
    Apply(String),
    Remove,
}

pub const INSERT_MEDIA: Command<InsertMediaPayload> = Command::new("insert-media");
pub const TOGGLE_LINK: Command<ToggleLinkPayload> = Command::new("toggle-link");
pub const TOGGLE_TEXT_FORMAT: Command<TextFormatType> = Command::new("toggle-text-format");
pub const SELECTION_CHANGE: Command<()> = Command::new("selection-changed");

pub(crate) type Handler = Rc<dyn Fn(&mut Editor, &dyn Any) -> Result<bool, EditorError>>;

struct HandlerEntry {
    id: u64,
    priority: CommandPriority,
    handler: Handler,
}

/// Per-editor handler table.
#[derive(Default)]
pub(crate) struct CommandRegistry {
    next_id: u64,
    handlers: HashMap<&'static str, Vec<HandlerEntry>>,
}

impl CommandRegistry {
    pub(crate) fn insert(
        &mut self,
        name: &'static str,
        priority: CommandPriority,
        handler: Handler,
    ) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        let entries = self.handlers.entry(name).or_default();
        // Descending priority; registration order within one level.
        let at = entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(entries.len());
        entries.insert(at, HandlerEntry { id, priority, handler });
        id
    }

    fn remove(&mut self, name: &'static str, id: u64) -> bool {
        let Some(entries) = self.handlers.get_mut(name) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.handlers.remove(name);
        }
        removed
    }

    /// A copy of the walk order, so handlers may (un)register while a
    /// dispatch is in flight.
    pub(crate) fn handlers_for(&self, name: &str) -> Vec<(CommandPriority, Handler)> {
        self.handlers
            .get(name)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| (e.priority, Rc::clone(&e.handler)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, name: &str) -> usize {
        self.handlers.get(name).map_or(0, Vec::len)
    }
}

/// What a committed update changed.
#[derive(Debug, Clone)]
pub struct UpdateEvent {
    pub prev: Rc<Snapshot>,
    pub next: Rc<Snapshot>,
    pub dirty: BTreeSet<NodeKey>,
    pub selection_changed: bool,
    pub source: Option<String>,
}

pub(crate) type UpdateListener = Rc<dyn Fn(&UpdateEvent)>;

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(u64, UpdateListener)>,
}

impl ListenerRegistry {
    pub(crate) fn insert(&mut self, listener: UpdateListener) -> u64 {
        self.next_id += 1;
        self.listeners.push((self.next_id, listener));
        self.next_id
    }

    fn remove(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub(crate) fn snapshot(&self) -> Vec<UpdateListener> {
        self.listeners.iter().map(|(_, l)| Rc::clone(l)).collect()
    }
}

enum Target {
    Command {
        registry: Weak<RefCell<CommandRegistry>>,
        name: &'static str,
        id: u64,
    },
    Listener {
        registry: Weak<RefCell<ListenerRegistry>>,
        id: u64,
    },
}

/// Handle for one registered handler or listener. Unregistering is explicit;
/// dropping the handle leaves the registration in place.
#[must_use = "keep the registration so it can be unregistered on teardown"]
pub struct Registration {
    target: Target,
}

impl Registration {
    pub(crate) fn command(
        registry: &Rc<RefCell<CommandRegistry>>,
        name: &'static str,
        id: u64,
    ) -> Self {
        Self {
            target: Target::Command {
                registry: Rc::downgrade(registry),
                name,
                id,
            },
        }
    }

    pub(crate) fn listener(registry: &Rc<RefCell<ListenerRegistry>>, id: u64) -> Self {
        Self {
            target: Target::Listener {
                registry: Rc::downgrade(registry),
                id,
            },
        }
    }

    /// Returns false if the editor is gone or the entry was already removed.
    pub fn unregister(self) -> bool {
        match self.target {
            Target::Command { registry, name, id } => registry
                .upgrade()
                .is_some_and(|r| r.borrow_mut().remove(name, id)),
            Target::Listener { registry, id } => registry
                .upgrade()
                .is_some_and(|r| r.borrow_mut().remove(id)),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Command { name, id, .. } => {
                write!(f, "Registration(command {name} #{id})")
            }
            Target::Listener { id, .. } => write!(f, "Registration(listener #{id})"),
        }
    }
}

/// Registrations owned by one mounted plugin, torn down together.
#[derive(Debug, Default)]
#[must_use = "keep the registrations so they can be unregistered on teardown"]
pub struct Registrations(Vec<Registration>);

impl Registrations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, registration: Registration) {
        self.0.push(registration);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn unregister_all(self) {
        for registration in self.0 {
            registration.unregister();
        }
    }
}

impl From<Vec<Registration>> for Registrations {
    fn from(v: Vec<Registration>) -> Self {
        Self(v)
    }
}

impl Extend<Registration> for Registrations {
    fn extend<T: IntoIterator<Item = Registration>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}
