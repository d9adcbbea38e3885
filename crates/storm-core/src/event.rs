//! Per-object event hub.
//!
//! Each tracked object carries its own callback table; there is no global
//! dispatch. Handlers run synchronously on the mutating call and may
//! themselves hook, unhook, or mutate — `emit` snapshots the handler list
//! before invoking it.

use crate::variable::VarValue;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Payload of a `Changed` event.
#[derive(Debug, Clone)]
pub struct Changed {
    /// Index of the column whose variable changed.
    pub column: usize,
    /// Contents before the assignment.
    pub old: VarValue,
    /// Contents after the assignment.
    pub new: VarValue,
    /// Whether the new value came from the database.
    pub from_db: bool,
}

/// Lifecycle events observable on a tracked object.
#[derive(Debug, Clone)]
pub enum Event {
    /// The object was attached to a store.
    Added,
    /// The object's pending work was written out.
    Flushed,
    /// The object finished hydrating from a row.
    Loaded,
    /// A column variable was assigned.
    Changed(Changed),
}

/// Identifier returned by [`EventHub::hook`], used to unhook.
pub type HookId = u64;

type Handler = Rc<dyn Fn(&Event)>;

/// A small per-object callback registry.
#[derive(Default)]
pub struct EventHub {
    next_id: Cell<HookId>,
    hooks: RefCell<Vec<(HookId, Handler)>>,
}

impl EventHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for all events on this object.
    pub fn hook(&self, handler: impl Fn(&Event) + 'static) -> HookId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.hooks.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    /// Remove a previously registered handler.
    ///
    /// Returns `false` if the id was unknown (or already unhooked).
    pub fn unhook(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.borrow_mut();
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() != before
    }

    /// Invoke every registered handler with `event`.
    pub fn emit(&self, event: &Event) {
        // Snapshot so handlers can hook/unhook re-entrantly.
        let handlers: Vec<Handler> = self
            .hooks
            .borrow()
            .iter()
            .map(|(_, h)| Rc::clone(h))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.hooks.borrow().len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.borrow().is_empty()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub").field("hooks", &self.len()).finish()
    }
}
