//! Advisory lock guarding the update pipeline
//!
//! The lock is a file created with create-new semantics, carrying the
//! owner pid and acquisition time. A lock older than the staleness
//! threshold is assumed to belong to a crashed run and is broken with a
//! warning. The lock is released on drop.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::UpdateError;

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: i64,
}

/// Held while an update runs; removing the file on drop releases it.
#[derive(Debug)]
pub struct UpdateLock {
    path: PathBuf,
}

impl UpdateLock {
    /// Take the lock, breaking a stale one if necessary.
    pub fn acquire(path: &Path, stale_after_secs: i64) -> Result<Self, UpdateError> {
        match Self::try_create(path) {
            Ok(lock) => Ok(lock),
            Err(UpdateError::Locked(holder)) => {
                if Self::is_stale(path, stale_after_secs) {
                    warn!("Breaking stale update lock at {}", path.display());
                    let _ = std::fs::remove_file(path);
                    Self::try_create(path)
                } else {
                    Err(UpdateError::Locked(holder))
                }
            }
            Err(e) => Err(e),
        }
    }

    fn try_create(path: &Path) -> Result<Self, UpdateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let info = LockInfo {
                    pid: std::process::id(),
                    acquired_at: chrono::Utc::now().timestamp(),
                };
                file.write_all(serde_json::to_string(&info)?.as_bytes())?;
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(path).unwrap_or_default();
                Err(UpdateError::Locked(if holder.is_empty() {
                    path.display().to_string()
                } else {
                    holder
                }))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_stale(path: &Path, stale_after_secs: i64) -> bool {
        let Ok(content) = std::fs::read_to_string(path) else {
            // Unreadable lock file counts as stale
            return true;
        };
        match serde_json::from_str::<LockInfo>(&content) {
            Ok(info) => chrono::Utc::now().timestamp() - info.acquired_at > stale_after_secs,
            Err(_) => true,
        }
    }

    /// Whether a live (non-stale) lock currently exists.
    pub fn is_locked(path: &Path, stale_after_secs: i64) -> bool {
        path.exists() && !Self::is_stale(path, stale_after_secs)
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("could not release update lock {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("update.lock");

        {
            let _lock = UpdateLock::acquire(&path, 3600).unwrap();
            assert!(path.exists());
            assert!(UpdateLock::is_locked(&path, 3600));
        }
        // Dropped: released
        assert!(!path.exists());
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("update.lock");

        let _lock = UpdateLock::acquire(&path, 3600).unwrap();
        let err = UpdateLock::acquire(&path, 3600).unwrap_err();
        assert!(matches!(err, UpdateError::Locked(_)));
    }

    #[test]
    fn stale_lock_is_broken() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("update.lock");

        let stale = LockInfo {
            pid: 1,
            acquired_at: chrono::Utc::now().timestamp() - 10_000,
        };
        std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        assert!(!UpdateLock::is_locked(&path, 3600));
        let _lock = UpdateLock::acquire(&path, 3600).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn garbage_lock_counts_as_stale() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("update.lock");
        std::fs::write(&path, "not json").unwrap();

        let _lock = UpdateLock::acquire(&path, 3600).unwrap();
    }
}
