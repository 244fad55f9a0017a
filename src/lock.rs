//! Run-level mutual exclusion
//!
//! A best-effort single-instance guard: the marker's existence is the
//! only overlap signal. A process killed before release leaves a stale
//! marker behind, and every later run fails with `AlreadyRunning` until
//! an operator clears it. That is the accepted tradeoff, not something
//! this module tries to repair.

use crate::state::MarkerFlag;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Another run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Store(#[from] crate::error::Error),
}

/// Process-wide single-run guard over a [`MarkerFlag`].
pub struct RunLock {
    flag: Arc<dyn MarkerFlag>,
}

impl RunLock {
    #[must_use]
    pub fn new(flag: Arc<dyn MarkerFlag>) -> Self {
        Self { flag }
    }

    /// Try to claim the run slot.
    ///
    /// Single-shot: if the marker already exists this fails immediately
    /// with [`LockError::AlreadyRunning`]. There is no waiting or retry.
    ///
    /// # Errors
    ///
    /// [`LockError::AlreadyRunning`] when another run holds the marker;
    /// [`LockError::Store`] when the marker cannot be read or created.
    pub fn acquire(&self) -> Result<RunGuard, LockError> {
        if self.flag.is_set()? {
            return Err(LockError::AlreadyRunning);
        }
        self.flag.set()?;
        Ok(RunGuard {
            flag: Arc::clone(&self.flag),
            released: false,
        })
    }
}

/// Held for the duration of a run.
///
/// Clears the marker when dropped, so release happens on every exit
/// path, panics included. A failed clear is logged; there is nothing
/// else to do with it at that point.
pub struct RunGuard {
    flag: Arc<dyn MarkerFlag>,
    released: bool,
}

impl RunGuard {
    /// Clear the marker now instead of at drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.flag.clear() {
            warn!("Failed to clear run marker: {e}");
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
