//! Subscribers notified after a rule-set refresh.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked with the rule-set tag after its data was refreshed.
pub type UpdateCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Opaque handle returned by registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u64);

/// Ordered subscriber list with its own lock.
#[derive(Default)]
pub struct CallbackRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<(CallbackHandle, UpdateCallback)>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: UpdateCallback) -> CallbackHandle {
        let handle = CallbackHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((handle, callback));
        handle
    }

    /// Remove a subscriber. Returns `false` if the handle was unknown.
    pub fn unregister(&self, handle: CallbackHandle) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|(h, _)| *h == handle) {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Invoke every subscriber once, in registration order.
    ///
    /// The list is snapshotted first; callbacks run without the lock held
    /// and may register or unregister freely.
    pub fn notify(&self, tag: &str) {
        let snapshot: Vec<UpdateCallback> =
            self.entries.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in snapshot {
            callback(tag);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
