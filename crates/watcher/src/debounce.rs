//! Event folding and dispatch exclusion
//!
//! [`Pending`] folds raw events into one entry per path between two
//! dispatch boundaries. [`DispatchGate`] makes sure at most one dispatch
//! runs at a time and remembers requests that arrived while it was busy.

use crate::event::Op;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default quiet period before a cycle is dispatched
pub const DEFAULT_SQUASH: std::time::Duration = std::time::Duration::from_millis(727);

/// Changed paths waiting for the next dispatch
///
/// Maps each normalized path to the number of events folded into it.
#[derive(Debug, Default)]
pub struct Pending {
    files: Mutex<HashMap<String, u32>>,
}

impl Pending {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the set
    ///
    /// `Remove` and `Rename` drop the path, anything else counts it.
    /// Returns `true` when this event started a new cycle, i.e. the set
    /// was empty before.
    pub fn fold(&self, path: &str, op: Op) -> bool {
        let mut files = self.files.lock();
        let was_empty = files.is_empty();

        match op {
            Op::Remove | Op::Rename => {
                files.remove(path);
            }
            _ => *files.entry(path.to_string()).or_insert(0) += 1,
        }

        was_empty && !files.is_empty()
    }

    /// Swap the set for an empty one and return the old contents
    pub fn take(&self) -> HashMap<String, u32> {
        std::mem::take(&mut *self.files.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }
}

/// Single dispatch slot plus a retry counter
///
/// Acquiring the slot and recording a retry happen under the same lock as
/// releasing the slot and reading the counter, so a request that loses the
/// race for the slot is always seen by the dispatch that holds it.
#[derive(Debug)]
pub struct DispatchGate {
    token: Arc<Semaphore>,
    retry: Mutex<u32>,
}

impl Default for DispatchGate {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchGate {
    pub fn new() -> Self {
        Self {
            token: Arc::new(Semaphore::new(1)),
            retry: Mutex::new(0),
        }
    }

    /// Take the slot, or count a retry if a dispatch is running
    pub fn try_begin(&self) -> Option<OwnedSemaphorePermit> {
        let mut retry = self.retry.lock();
        match Arc::clone(&self.token).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                *retry = retry.saturating_add(1);
                None
            }
        }
    }

    /// Release the slot
    ///
    /// Returns `true` when requests arrived while the slot was held; the
    /// counter is reset.
    pub fn finish(&self, permit: OwnedSemaphorePermit) -> bool {
        let mut retry = self.retry.lock();
        drop(permit);
        std::mem::take(&mut *retry) > 0
    }

    /// Wait until no dispatch is running, then refuse all further ones
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        if let Ok(permit) = self.token.acquire().await {
            permit.forget();
        }
        self.token.close();
        *self.retry.lock() = 0;
    }

    pub fn is_busy(&self) -> bool {
        self.token.available_permits() == 0
    }

    pub fn retries(&self) -> u32 {
        *self.retry.lock()
    }
}
