//! Cross-run state stores
//!
//! The run marker and the per-account reconnect stamps are the only state
//! shared across process invocations. Both sit behind small capability
//! traits so the orchestration logic can be exercised against in-memory
//! fakes; the filesystem implementations below are what the binary wires
//! in.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Existence flag signalling "a run is in progress".
pub trait MarkerFlag: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the flag's backing store cannot be read.
    fn is_set(&self) -> Result<bool>;

    /// # Errors
    ///
    /// Returns an error if the flag cannot be created.
    fn set(&self) -> Result<()>;

    /// Remove the flag. Must be safe to call when the flag is not set.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing flag cannot be removed.
    fn clear(&self) -> Result<()>;
}

/// Persistent map from throttle key to the epoch second of the last
/// permitted contact attempt.
pub trait ThrottleStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or holds a corrupt
    /// entry for `key`.
    fn last_attempt(&self, key: &str) -> Result<Option<i64>>;

    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    fn record_attempt(&self, key: &str, epoch_secs: i64) -> Result<()>;
}

/// Run marker as a file in the state directory.
///
/// If the process is killed before `clear`, the file stays behind and
/// every later run refuses to start until it is removed by hand.
#[derive(Debug, Clone)]
pub struct FsMarkerFlag {
    path: PathBuf,
}

impl FsMarkerFlag {
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("mail-relay.lock"),
        }
    }

    /// Location of the marker file, for operator-facing messages.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MarkerFlag for FsMarkerFlag {
    fn is_set(&self) -> Result<bool> {
        Ok(self.path.try_exists()?)
    }

    fn set(&self) -> Result<()> {
        fs::write(&self.path, format!("{}\n", std::process::id()))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// One stamp file per throttle key in the state directory.
#[derive(Debug, Clone)]
pub struct FsThrottleStore {
    dir: PathBuf,
}

impl FsThrottleStore {
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.to_path_buf(),
        }
    }

    fn stamp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("mail-relay.last.{key}"))
    }
}

impl ThrottleStore for FsThrottleStore {
    fn last_attempt(&self, key: &str) -> Result<Option<i64>> {
        let path = self.stamp_path(key);
        match fs::read_to_string(&path) {
            Ok(data) => {
                let secs = data.trim().parse().map_err(|e| {
                    Error::State(format!("Corrupt stamp {}: {e}", path.display()))
                })?;
                Ok(Some(secs))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn record_attempt(&self, key: &str, epoch_secs: i64) -> Result<()> {
        fs::write(self.stamp_path(key), format!("{epoch_secs}\n"))?;
        Ok(())
    }
}
