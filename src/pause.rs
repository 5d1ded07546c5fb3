//! Process-wide pause signal for background work.
//!
//! Refresh loops call [`PauseManager::wait_active`] before touching the
//! network, so a platform can hold all periodic downloads while the device
//! sleeps or the network is metered.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

use crate::cancel::CancelToken;

/// How often a paused waiter re-checks its cancel token.
const CANCEL_POLL: Duration = Duration::from_millis(200);

/// Gate for background periodic work.
pub trait PauseManager: Send + Sync {
    /// Block until background work may run.
    ///
    /// Returns `false` if `cancel` fired while waiting.
    fn wait_active(&self, cancel: &CancelToken) -> bool;
}

/// Pause manager that never pauses.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysActive;

impl PauseManager for AlwaysActive {
    fn wait_active(&self, cancel: &CancelToken) -> bool {
        !cancel.is_cancelled()
    }
}

/// Pause manager driven by explicit `pause` / `resume` calls.
#[derive(Default)]
pub struct PauseController {
    paused: Mutex<bool>,
    cond: Condvar,
}

impl PauseController {
    /// Create a controller in the active state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold background work.
    pub fn pause(&self) {
        *self.paused.lock() = true;
        log::debug!("background work paused");
    }

    /// Release background work and wake every waiter.
    pub fn resume(&self) {
        let mut paused = self.paused.lock();
        *paused = false;
        self.cond.notify_all();
        log::debug!("background work resumed");
    }

    /// Check if background work is currently held.
    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }
}

impl PauseManager for PauseController {
    fn wait_active(&self, cancel: &CancelToken) -> bool {
        let mut paused = self.paused.lock();
        while *paused {
            if cancel.is_cancelled() {
                return false;
            }
            self.cond.wait_for(&mut paused, CANCEL_POLL);
        }
        !cancel.is_cancelled()
    }
}
