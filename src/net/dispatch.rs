//! Syscall-keyed dispatch table.
//!
//! Every inbound frame is routed to the handlers registered for its syscall,
//! in subscription order. Handlers receive the owning state container by
//! mutable reference and run to completion before the next handler, so the
//! state they touch needs no locking.

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod dispatch_test;

use std::collections::HashMap;

use super::syscall::Syscall;
use super::types::Frame;

/// Frame handler over state `S`.
pub type Handler<S> = Box<dyn FnMut(&mut S, &Frame) + Send>;

/// Token returned by [`Dispatcher::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Explicit dispatch table: syscall → ordered handler list.
pub struct Dispatcher<S> {
    routes: HashMap<Syscall, Vec<(HandlerId, Handler<S>)>>,
    next_id: u64,
}

impl<S> Default for Dispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Dispatcher<S> {
    #[must_use]
    pub fn new() -> Self {
        Self { routes: HashMap::new(), next_id: 1 }
    }

    /// Register `handler` for `syscall`, after any existing handlers.
    pub fn subscribe<F>(&mut self, syscall: impl Into<Syscall>, handler: F) -> HandlerId
    where
        F: FnMut(&mut S, &Frame) + Send + 'static,
    {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.routes
            .entry(syscall.into())
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Remove a previously registered handler. Returns `false` if it was not found.
    pub fn unsubscribe(&mut self, syscall: impl Into<Syscall>, id: HandlerId) -> bool {
        let syscall = syscall.into();
        let Some(handlers) = self.routes.get_mut(&syscall) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            self.routes.remove(&syscall);
        }
        removed
    }

    /// Number of handlers registered for `syscall`.
    #[must_use]
    pub fn handler_count(&self, syscall: &Syscall) -> usize {
        self.routes.get(syscall).map_or(0, Vec::len)
    }

    /// Route `frame` to every handler for its syscall.
    ///
    /// Returns `false` when no handler is registered; the caller decides
    /// how to log the drop.
    pub fn dispatch(&mut self, state: &mut S, frame: &Frame) -> bool {
        let syscall = Syscall::parse(&frame.syscall);
        let Some(handlers) = self.routes.get_mut(&syscall) else {
            return false;
        };
        for (_, handler) in handlers.iter_mut() {
            handler(state, frame);
        }
        true
    }
}
