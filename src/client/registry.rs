//! Correlates in-flight operations with their ledger confirmations.

use crate::ledger::OperationId;

use std::collections::HashMap;
use tracing::debug;

/// One-shot continuation run when an operation's confirmation arrives.
pub type CompletionHandler = Box<dyn FnOnce() + Send>;

/// Maps operation identifiers to completion handlers.
///
/// Each handler runs at most once: dispatch removes the entry before invoking it.
/// Lives on the event-loop thread; the owner serialises access.
#[derive(Default)]
pub struct PendingOperationRegistry {
    handlers: HashMap<OperationId, CompletionHandler>,
}

impl PendingOperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `operation_id`, replacing any earlier one.
    pub fn register(&mut self, operation_id: OperationId, handler: CompletionHandler) {
        if self.handlers.insert(operation_id.clone(), handler).is_some() {
            debug!("Replaced completion handler for operation {}", operation_id);
        }
    }

    /// Remove the handler for `operation_id` without running it.
    pub fn take(&mut self, operation_id: &OperationId) -> Option<CompletionHandler> {
        self.handlers.remove(operation_id)
    }

    /// Run and drop the handler for `operation_id`. Returns whether one matched.
    pub fn dispatch(&mut self, operation_id: &OperationId) -> bool {
        match self.take(operation_id) {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, operation_id: &OperationId) -> bool {
        self.handlers.contains_key(operation_id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
