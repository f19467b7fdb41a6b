//! # Single-slot mailbox
//!
//! A [`Mailbox`] holds at most one value. Publishing overwrites whatever was there before, and
//! taking empties the slot. It is used between tasks where staleness is acceptable but blocking
//! is not: the latest dispatch command and the latest sensor reading.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crossbeam::atomic::AtomicCell;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Single-writer/single-reader overwrite slot.
pub struct Mailbox<T> {
    slot: AtomicCell<Option<T>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: AtomicCell::new(None),
        }
    }

    /// Publish a value, returning the unread value it replaced (if any).
    pub fn publish(&self, value: T) -> Option<T> {
        self.slot.swap(Some(value))
    }

    /// Take the latest value, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        self.slot.swap(None)
    }

    /// Discard any unread value.
    pub fn clear(&self) {
        self.slot.swap(None);
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
