//! At most one armed retry timer per account and operation kind.

use super::outcome::OperationKind;

use std::collections::HashMap;
use tokio::task::AbortHandle;
use tracing::debug;

pub(crate) type RetryKey = (usize, OperationKind);

#[derive(Debug, Default)]
pub(crate) struct RetrySlots {
    next_ticket: u64,
    slots: HashMap<RetryKey, (u64, AbortHandle)>,
}

impl RetrySlots {
    /// Ticket identifying the timer about to be armed.
    pub(crate) fn reserve(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Arm `handle` for `key`, aborting whatever timer held the slot.
    pub(crate) fn arm(&mut self, key: RetryKey, ticket: u64, handle: AbortHandle) {
        if let Some((previous, stale)) = self.slots.insert(key, (ticket, handle)) {
            stale.abort();
            debug!(
                "Superseded retry {} for {} on account {}",
                previous, key.1, key.0
            );
        }
    }

    /// Abort the timer in `key`'s slot. Returns whether one was armed.
    pub(crate) fn cancel(&mut self, key: RetryKey) -> bool {
        match self.slots.remove(&key) {
            Some((ticket, handle)) => {
                handle.abort();
                debug!("Cancelled retry {} for {} on account {}", ticket, key.1, key.0);
                true
            }
            None => false,
        }
    }

    /// Called by a timer as it fires: free the slot if it still holds `ticket`.
    pub(crate) fn release(&mut self, key: RetryKey, ticket: u64) {
        if self.slots.get(&key).is_some_and(|(held, _)| *held == ticket) {
            self.slots.remove(&key);
        }
    }

    pub(crate) fn is_armed(&self, key: RetryKey) -> bool {
        self.slots.contains_key(&key)
    }
}
