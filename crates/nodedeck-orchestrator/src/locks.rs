//! Per-app action locks
//!
//! A second action on an app that is already busy is rejected, never queued.

use nodedeck_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Registry of app ids with an action in flight
#[derive(Debug, Clone, Default)]
pub struct ActionLocks {
    busy: Arc<Mutex<HashSet<u32>>>,
}

impl ActionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `app_id`, or fail with `Error::Busy` if another action holds it
    pub fn try_acquire(&self, app_id: u32) -> Result<ActionGuard> {
        if !self.busy.lock().insert(app_id) {
            debug!("App {} is busy", app_id);
            return Err(Error::Busy(app_id));
        }
        Ok(ActionGuard {
            busy: Arc::clone(&self.busy),
            app_id,
        })
    }

    pub fn is_busy(&self, app_id: u32) -> bool {
        self.busy.lock().contains(&app_id)
    }
}

/// Releases the app id when dropped
#[derive(Debug)]
pub struct ActionGuard {
    busy: Arc<Mutex<HashSet<u32>>>,
    app_id: u32,
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        self.busy.lock().remove(&self.app_id);
    }
}
