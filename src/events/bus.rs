//! Generic event bus.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::Result;

/// A payload union whose variants are addressed by a copyable kind.
pub trait BusEvent {
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Handler invoked synchronously for each matching trigger.
pub type EventHandler<E> = Arc<dyn Fn(&E) -> Result<()> + Send + Sync>;

/// Ordered handler lists keyed by event kind.
///
/// Handlers run on the caller's thread in registration order. The first
/// handler error aborts the trigger and is returned to the caller. The
/// "triggered" markers survive until [`EventBus::reset`]; handlers are kept.
pub struct EventBus<E: BusEvent> {
    handlers: HashMap<E::Kind, Vec<EventHandler<E>>>,
    triggered: HashSet<E::Kind>,
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            triggered: HashSet::new(),
        }
    }

    /// Register a handler for `kind`, after any already registered.
    pub fn on<F>(&mut self, kind: E::Kind, handler: F)
    where
        F: Fn(&E) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Mark the event's kind as triggered, then run its handlers in order.
    pub fn trigger(&mut self, event: &E) -> Result<()> {
        let kind = event.kind();
        self.triggered.insert(kind);
        let Some(handlers) = self.handlers.get(&kind) else {
            return Ok(());
        };
        for handler in handlers {
            handler(event)?;
        }
        Ok(())
    }

    pub fn has_triggered(&self, kind: E::Kind) -> bool {
        self.triggered.contains(&kind)
    }

    /// Clear triggered markers only.
    pub fn reset(&mut self) {
        self.triggered.clear();
    }

    pub fn handler_count(&self, kind: E::Kind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self
            .handlers
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("EventBus")
            .field("handlers", &counts)
            .field("triggered", &self.triggered)
            .finish()
    }
}
