//! Filesystem layout of the certificate directory

use std::path::{Path, PathBuf};

/// File name of the active CA bundle
pub const BUNDLE_FILE_NAME: &str = "ca-bundle.pem";
/// Suffix appended to timestamped bundle backups
pub const BACKUP_SUFFIX: &str = ".backup";

/// Paths derived from a single certificate directory
///
/// ```text
/// <cert-dir>/ca-bundle.pem
/// <cert-dir>/ca-bundle.pem.<timestamp>.backup
/// <cert-dir>/ca-bundle.pem.lock
/// <cert-dir>/cache/<sha256(locator)>.pem
/// <cert-dir>/config/<record>.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertDirLayout {
    root: PathBuf,
}

impl CertDirLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.root.join(BUNDLE_FILE_NAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(format!("{BUNDLE_FILE_NAME}.lock"))
    }

    pub fn staging_path(&self) -> PathBuf {
        self.root.join(format!("{BUNDLE_FILE_NAME}.tmp"))
    }

    /// Backup path for a given timestamp label
    pub fn backup_path(&self, timestamp: &str) -> PathBuf {
        self.root
            .join(format!("{BUNDLE_FILE_NAME}.{timestamp}{BACKUP_SUFFIX}"))
    }

    /// Whether `file_name` names a bundle backup
    pub fn is_backup_name(file_name: &str) -> bool {
        file_name.starts_with(&format!("{BUNDLE_FILE_NAME}."))
            && file_name.ends_with(BACKUP_SUFFIX)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Default [`FileStore`](super::FileStore) directory
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    /// Create the root and cache directories
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.cache_dir())
    }
}
