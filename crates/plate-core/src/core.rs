use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::command::{
    Command, CommandPriority, CommandRegistry, ListenerRegistry, Registration, SELECTION_CHANGE,
    UpdateEvent,
};
use crate::error::{ConfigError, EditorError};
use crate::node::{NodeKey, kind};
use crate::plugin::NodeRegistry;
use crate::project::{self, DomElement};
use crate::selection::Selection;
use crate::serde_value::{PlateValue, serialize_node};
use crate::snapshot::Snapshot;
use crate::transaction::{KeyAllocator, Transaction};

pub type ErrorCallback = Rc<dyn Fn(&EditorError)>;
pub type InitFn = Box<dyn FnOnce(&mut Transaction<'_>) -> Result<(), EditorError>>;

/// How the first snapshot is produced.
#[derive(Default)]
pub enum InitialState {
    /// A single empty paragraph.
    #[default]
    Empty,
    /// A persisted `PlateValue` document.
    Json(String),
    With(InitFn),
}

pub struct EditorConfig {
    pub namespace: String,
    pub nodes: NodeRegistry,
    pub initial_state: InitialState,
    pub read_only: bool,
    pub on_error: Option<ErrorCallback>,
    pub clock: Option<Rc<dyn Clock>>,
    pub max_normalize_iterations: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            namespace: "manos-plate".to_string(),
            nodes: NodeRegistry::richtext(),
            initial_state: InitialState::Empty,
            read_only: false,
            on_error: None,
            clock: None,
            max_normalize_iterations: 0,
        }
    }
}

impl EditorConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn nodes(mut self, nodes: NodeRegistry) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn initial_state(mut self, initial_state: InitialState) -> Self {
        self.initial_state = initial_state;
        self
    }

    pub fn initial_json(self, json: impl Into<String>) -> Self {
        self.initial_state(InitialState::Json(json.into()))
    }

    pub fn initial_with(
        self,
        init: impl FnOnce(&mut Transaction<'_>) -> Result<(), EditorError> + 'static,
    ) -> Self {
        self.initial_state(InitialState::With(Box::new(init)))
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn on_error(mut self, on_error: impl Fn(&EditorError) + 'static) -> Self {
        self.on_error = Some(Rc::new(on_error));
        self
    }

    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn with_defaults(mut self) -> Self {
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        self
    }
}

const REQUIRED_NODES: [&str; 3] = [kind::ROOT, kind::PARAGRAPH, kind::TEXT];

/// One editor instance: the committed snapshot plus everything registered
/// against it. Nothing here is shared between instances.
pub struct Editor {
    namespace: String,
    registry: Rc<NodeRegistry>,
    state: Rc<Snapshot>,
    keys: KeyAllocator,
    read_only: bool,
    on_error: Option<ErrorCallback>,
    clock: Rc<dyn Clock>,
    max_normalize_iterations: usize,
    commands: Rc<RefCell<CommandRegistry>>,
    listeners: Rc<RefCell<ListenerRegistry>>,
}

impl Editor {
    pub fn new(config: EditorConfig) -> Result<Self, EditorError> {
        let EditorConfig {
            namespace,
            nodes,
            initial_state,
            read_only,
            on_error,
            clock,
            max_normalize_iterations,
        } = config.with_defaults();

        for kind in REQUIRED_NODES {
            if !nodes.has(kind) {
                return Err(ConfigError::MissingRequiredNode(kind).into());
            }
        }

        let mut editor = Self {
            namespace,
            registry: Rc::new(nodes),
            state: Rc::new(Snapshot::empty()),
            keys: KeyAllocator::new(),
            read_only,
            on_error,
            clock: clock.unwrap_or_else(|| Rc::new(SystemClock)),
            max_normalize_iterations,
            commands: Rc::default(),
            listeners: Rc::default(),
        };
        editor.load_initial_state(initial_state)?;
        tracing::debug!(namespace = %editor.namespace, nodes = editor.state.len(), "editor ready");
        Ok(editor)
    }

    fn load_initial_state(&mut self, initial_state: InitialState) -> Result<(), EditorError> {
        let loaded = match initial_state {
            InitialState::Empty => self.update("init", |_| Ok(())),
            InitialState::Json(json) => match PlateValue::from_json_str(&json) {
                Ok(value) => self.update("init", |tx| value.read_into(tx)),
                Err(err) => Err(err.into()),
            },
            InitialState::With(init) => self.update("init", init),
        };
        match loaded {
            Ok(()) => Ok(()),
            Err(EditorError::Schema(err)) => {
                tracing::error!(
                    namespace = %self.namespace,
                    error = %err,
                    "initial state is unreadable; starting from an empty document"
                );
                self.update("init", |_| Ok(()))
            }
            Err(err) => Err(err),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.clock)
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// The latest committed snapshot.
    pub fn state(&self) -> Rc<Snapshot> {
        Rc::clone(&self.state)
    }

    pub fn read<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.state)
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.state.selection()
    }

    pub fn has_nodes(&self, kinds: &[&str]) -> bool {
        kinds.iter().all(|k| self.registry.has(k))
    }

    /// Runs `f` against a draft of the latest snapshot and commits the result
    /// atomically. An error from `f` discards the draft.
    pub fn update<R>(
        &mut self,
        source: impl Into<String>,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<R, EditorError>,
    ) -> Result<R, EditorError> {
        let registry = Rc::clone(&self.registry);
        let mut tx = Transaction::new(&registry, &mut self.keys, &self.state, Some(source.into()));
        let out = match f(&mut tx) {
            Ok(out) => out,
            Err(err) => return Err(self.forward_fault(err)),
        };

        let untouched = !tx.is_dirty() && tx.selection() == self.state.selection();
        // The first update always commits so normalization runs on the seed.
        if untouched && self.state.version() > 0 {
            return Ok(out);
        }

        let committed = match tx.commit(self.max_normalize_iterations) {
            Ok(committed) => committed,
            Err(err) => return Err(self.forward_fault(err)),
        };

        let prev = std::mem::replace(&mut self.state, Rc::new(committed.state));
        let selection_changed = prev.selection() != self.state.selection();
        tracing::debug!(
            namespace = %self.namespace,
            version = self.state.version(),
            dirty = committed.dirty.len(),
            source = committed.meta.source.as_deref().unwrap_or(""),
            "committed update"
        );

        let event = UpdateEvent {
            prev,
            next: Rc::clone(&self.state),
            dirty: committed.dirty,
            selection_changed,
            source: committed.meta.source,
        };
        let listeners = self.listeners.borrow().snapshot();
        for listener in listeners {
            listener(&event);
        }

        if selection_changed {
            self.dispatch(SELECTION_CHANGE, ())?;
        }
        Ok(out)
    }

    fn forward_fault(&self, err: EditorError) -> EditorError {
        if matches!(err, EditorError::EngineFault(_)) {
            self.report_error(&err);
        }
        err
    }

    /// A range given without a format picks up the format of the text under
    /// its anchor.
    pub fn set_selection(&mut self, selection: Option<Selection>) -> Result<(), EditorError> {
        self.update("selection", |tx| {
            match selection {
                Some(Selection::Range(range)) if range.format.is_empty() => {
                    tx.select_range(range.anchor, range.focus)
                }
                other => tx.set_selection(other),
            }
            Ok(())
        })
    }

    /// Walks the handlers for `command` from highest priority down until one
    /// reports the command handled. Outcomes show up in the next snapshot;
    /// only handler errors come back.
    pub fn dispatch<P: 'static>(
        &mut self,
        command: Command<P>,
        payload: P,
    ) -> Result<(), EditorError> {
        if self.read_only && command.name() != SELECTION_CHANGE.name() {
            tracing::warn!(command = command.name(), "dispatch refused: editor is read-only");
            return Err(EditorError::ReadOnly);
        }

        let handlers = self.commands.borrow().handlers_for(command.name());
        tracing::debug!(command = command.name(), handlers = handlers.len(), "dispatch");
        let payload: &dyn Any = &payload;
        for (priority, handler) in handlers {
            if handler(self, payload)? {
                tracing::trace!(command = command.name(), ?priority, "handled");
                return Ok(());
            }
            tracing::trace!(command = command.name(), ?priority, "passed on");
        }
        tracing::debug!(command = command.name(), "no handler took the command");
        Ok(())
    }

    pub fn register_command<P: 'static>(
        &self,
        command: Command<P>,
        priority: CommandPriority,
        handler: impl Fn(&mut Editor, &P) -> Result<bool, EditorError> + 'static,
    ) -> Registration {
        let name = command.name();
        let erased = move |editor: &mut Editor, payload: &dyn Any| match payload.downcast_ref::<P>()
        {
            Some(payload) => handler(editor, payload),
            None => {
                tracing::warn!(command = name, "payload type does not match handler");
                Ok(false)
            }
        };
        let id = self
            .commands
            .borrow_mut()
            .insert(name, priority, Rc::new(erased));
        Registration::command(&self.commands, name, id)
    }

    pub fn handler_count<P: 'static>(&self, command: Command<P>) -> usize {
        self.commands.borrow().count(command.name())
    }

    /// `listener` runs after every committed update.
    pub fn register_update_listener(
        &self,
        listener: impl Fn(&UpdateEvent) + 'static,
    ) -> Registration {
        let id = self.listeners.borrow_mut().insert(Rc::new(listener));
        Registration::listener(&self.listeners, id)
    }

    /// Forwards an engine fault to the host.
    pub fn report_error(&self, err: &EditorError) {
        tracing::error!(namespace = %self.namespace, error = %err, "editor fault");
        if let Some(on_error) = &self.on_error {
            on_error(err);
        }
    }

    pub fn serialize_node(&self, key: NodeKey) -> Result<Value, EditorError> {
        serialize_node(&self.state, &self.registry, key)
    }

    pub fn to_value(&self) -> Result<PlateValue, EditorError> {
        PlateValue::from_snapshot(&self.state, &self.registry)
    }

    pub fn to_json_pretty(&self) -> Result<String, EditorError> {
        self.to_value()?
            .to_json_pretty()
            .map_err(|err| EditorError::Schema(err.into()))
    }

    pub fn project(&self) -> Option<DomElement> {
        project::project(&self.state, &self.registry, NodeKey::ROOT)
    }

    pub fn export_html(&self) -> String {
        project::export_html(&self.state, &self.registry)
    }
}
