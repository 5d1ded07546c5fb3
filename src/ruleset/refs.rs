//! Reference counting for rule-set data.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Returned when a decrement has no matching increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefUnderflow;

/// Count of routing rules depending on a rule-set.
///
/// The counter never goes below zero: an unmatched decrement leaves it
/// unchanged and reports [`RefUnderflow`].
#[derive(Debug, Default)]
pub struct RefCounter {
    count: AtomicUsize,
}

impl RefCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment, returning the new count.
    pub fn increment(&self) -> usize {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement, returning the new count.
    pub fn decrement(&self) -> Result<usize, RefUnderflow> {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|prev| prev - 1)
            .map_err(|_| RefUnderflow)
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}
