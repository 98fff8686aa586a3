//! One deployment at a time per working tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created mutex per `mount_location`.
///
/// A second deployment of the same working tree waits for the first to
/// finish instead of interleaving git and hook commands with it.
#[derive(Debug, Default)]
pub struct DeployLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DeployLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and returns the guard for `mount_location`.
    pub async fn acquire(&self, mount_location: &Path) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(mount_location).await;
        lock.lock_owned().await
    }

    /// Returns the guard only if no deployment of `mount_location` is running.
    pub async fn try_acquire(&self, mount_location: &Path) -> Option<OwnedMutexGuard<()>> {
        let lock = self.lock_for(mount_location).await;
        lock.try_lock_owned().ok()
    }

    async fn lock_for(&self, mount_location: &Path) -> Arc<Mutex<()>> {
        // Two spellings of the same directory must share a lock.
        let key = fs::canonicalize(mount_location)
            .await
            .unwrap_or_else(|_| mount_location.to_path_buf());

        let mut locks = self.locks.lock().await;
        locks.entry(key).or_default().clone()
    }
}
