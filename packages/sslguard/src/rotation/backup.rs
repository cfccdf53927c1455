//! Timestamped bundle backups and retention

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::config::CertDirLayout;
use crate::error::RotationError;

const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.6f";

/// One backup file on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

/// Copy the active bundle to a new timestamped backup
///
/// Returns `None` when there is no bundle to back up.
pub fn backup_bundle(layout: &CertDirLayout) -> Result<Option<PathBuf>, RotationError> {
    let bundle = layout.bundle_path();
    if !bundle.is_file() {
        return Ok(None);
    }
    let stamp = chrono::Utc::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
    let backup = layout.backup_path(&stamp);
    fs::copy(&bundle, &backup).map_err(|source| RotationError::Persistence {
        path: backup.clone(),
        source,
    })?;
    tracing::info!(backup = %backup.display(), "Backed up CA bundle");
    Ok(Some(backup))
}

/// Backups in the certificate directory, oldest first by modification time
pub fn list_backups(layout: &CertDirLayout) -> Result<Vec<BackupInfo>, RotationError> {
    let root = layout.root();
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(RotationError::Persistence {
                path: root.to_path_buf(),
                source,
            });
        }
    };

    let mut backups: Vec<BackupInfo> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(CertDirLayout::is_backup_name)
        })
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            metadata.is_file().then(|| BackupInfo {
                path: entry.path(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size: metadata.len(),
            })
        })
        .collect();
    backups.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    Ok(backups)
}

/// Delete all but the `retention_count` most recently modified backups
///
/// A retention of zero keeps everything. Returns the number of files removed.
pub fn cleanup_old_backups(layout: &CertDirLayout, retention_count: u32) -> Result<usize, RotationError> {
    if retention_count == 0 {
        return Ok(0);
    }
    let backups = list_backups(layout)?;
    let excess = backups.len().saturating_sub(retention_count as usize);
    let mut removed = 0;
    for backup in &backups[..excess] {
        match fs::remove_file(&backup.path) {
            Ok(()) => {
                removed += 1;
                tracing::debug!(backup = %backup.path.display(), "Removed old CA bundle backup");
            }
            Err(e) => tracing::warn!(backup = %backup.path.display(), error = %e, "Failed to remove old backup"),
        }
    }
    Ok(removed)
}

/// Whether `path` names a backup directly inside the certificate directory
pub fn is_backup_of(layout: &CertDirLayout, path: &Path) -> bool {
    path.parent() == Some(layout.root())
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(CertDirLayout::is_backup_name)
}
