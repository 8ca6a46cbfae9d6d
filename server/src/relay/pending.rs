//! Pending table: latest unflushed message per user.

use std::collections::HashMap;

use cmdrelay_sdk::{Broadcast, BusinessMessage};
use parking_lot::Mutex;

/// Coalescing buffer for one protocol.
///
/// A later message for the same user replaces the earlier one.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<String, BusinessMessage>>,
}

impl PendingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `message` under its user id, returning the message it replaced.
    pub fn insert(&self, message: BusinessMessage) -> Option<BusinessMessage> {
        self.entries.lock().insert(message.user_id.clone(), message)
    }

    /// Empties the table and returns what it held.
    #[must_use]
    pub fn take(&self) -> Broadcast {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Returns the number of users with a pending message.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
