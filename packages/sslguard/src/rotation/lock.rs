//! Advisory lock file guarding a rotation

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::RotationError;

/// Lock files older than this are considered abandoned
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(10 * 60);

/// Held for the duration of a rotation; the lock file is removed on drop
#[derive(Debug)]
pub struct RotationLock {
    path: PathBuf,
}

impl RotationLock {
    /// Create the lock file, replacing it once if it is stale
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, RotationError> {
        let path = path.into();
        match Self::create(&path) {
            Err(RotationError::LockHeld(_)) if is_stale(&path) => {
                tracing::warn!(lock = %path.display(), "Removing stale rotation lock");
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(lock = %path.display(), error = %e, "Failed to remove stale lock");
                }
                Self::create(&path)
            }
            other => other,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create(path: &Path) -> Result<Self, RotationError> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(RotationError::LockHeld(path.to_path_buf()));
            }
            Err(source) => {
                return Err(RotationError::Persistence {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        // Owner details only help operators; the lock holds without them.
        let _ = writeln!(file, "pid={} acquired={}", std::process::id(), chrono::Utc::now().to_rfc3339());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RotationLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "Failed to release rotation lock");
        }
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= STALE_LOCK_AGE)
}
