//! Single-shot completion handler slots
//!
//! A start or stop request hands the coordinator a callback that must fire
//! exactly once. `PendingCompletion` stores it and clears the slot on invoke.

use crate::error::TunnelError;

/// Callback resolving a start request
pub type StartCompletion = Box<dyn FnOnce(Result<(), TunnelError>) + Send + 'static>;

/// Callback resolving a stop request with the error that ended the session, if any
pub type StopCompletion = Box<dyn FnOnce(Option<TunnelError>) + Send + 'static>;

/// Slot holding at most one outstanding completion handler
pub struct PendingCompletion<T> {
    handler: Option<Box<dyn FnOnce(T) + Send + 'static>>,
}

impl<T> PendingCompletion<T> {
    /// Create an empty slot
    pub fn empty() -> Self {
        Self { handler: None }
    }

    /// Check if a handler is waiting to be resolved
    pub fn is_pending(&self) -> bool {
        self.handler.is_some()
    }

    /// Store a handler, returning any handler that was already pending
    pub fn set(
        &mut self,
        handler: Box<dyn FnOnce(T) + Send + 'static>,
    ) -> Option<Box<dyn FnOnce(T) + Send + 'static>> {
        self.handler.replace(handler)
    }

    /// Remove the handler without invoking it
    pub fn take(&mut self) -> Option<Box<dyn FnOnce(T) + Send + 'static>> {
        self.handler.take()
    }

    /// Invoke and clear the handler
    ///
    /// Returns false if nothing was pending.
    pub fn complete(&mut self, value: T) -> bool {
        match self.handler.take() {
            Some(handler) => {
                handler(value);
                true
            }
            None => false,
        }
    }
}

impl<T: Clone + Send + 'static> PendingCompletion<T> {
    /// Attach another handler that resolves together with the pending one
    ///
    /// Each handler still fires exactly once, in registration order.
    pub fn chain(&mut self, handler: Box<dyn FnOnce(T) + Send + 'static>) {
        let merged: Box<dyn FnOnce(T) + Send + 'static> = match self.handler.take() {
            Some(first) => Box::new(move |value: T| {
                first(value.clone());
                handler(value);
            }),
            None => handler,
        };
        self.handler = Some(merged);
    }
}

impl<T> Default for PendingCompletion<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> std::fmt::Debug for PendingCompletion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCompletion")
            .field("pending", &self.is_pending())
            .finish()
    }
}
