//! CA bundle rotation

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::backup::{self, BackupInfo};
use super::bundle::{
    MIN_BUNDLE_CERTIFICATES, assemble_bundle, count_certificate_markers, extract_certificates,
    near_expiring_roots,
};
use super::config::{CertificateSource, RotationConfig};
use super::lock::RotationLock;
use super::permissions::make_world_readable;
use crate::config::{CertDirLayout, ConfigStore, ROTATION_CONFIG_KEY, load_record, save_record};
use crate::error::{self, RotationError, StoreError};
use crate::tls::bundle_paths::is_readable_file;
use crate::transport::{Fetch, FetchOptions};

/// Per-source fetch timeout
pub const SOURCE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const SECONDS_PER_DAY: i64 = 86_400;

/// Snapshot of rotation state for operators
#[derive(Debug, Clone, Serialize)]
pub struct RotationStatus {
    pub last_rotation: Option<DateTime<Utc>>,
    pub next_rotation_due: Option<DateTime<Utc>>,
    pub needs_rotation: bool,
    pub bundle_path: PathBuf,
    pub bundle_size: Option<u64>,
    pub certificate_count: usize,
    pub backups: Vec<BackupInfo>,
}

/// Keeps the CA bundle in a certificate directory fresh
pub struct CertificateRotation {
    config: Mutex<RotationConfig>,
    layout: CertDirLayout,
    store: Arc<dyn ConfigStore>,
    fetcher: Arc<dyn Fetch>,
    rotation_guard: Mutex<()>,
}

impl std::fmt::Debug for CertificateRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateRotation")
            .field("layout", &self.layout)
            .field("config", &self.config())
            .finish_non_exhaustive()
    }
}

impl CertificateRotation {
    /// Load the persisted rotation record, defaults when absent
    pub fn new(
        layout: CertDirLayout,
        store: Arc<dyn ConfigStore>,
        fetcher: Arc<dyn Fetch>,
    ) -> error::Result<Self> {
        let config = load_record::<RotationConfig>(store.as_ref(), ROTATION_CONFIG_KEY)?.unwrap_or_default();
        Ok(Self::with_config(layout, store, fetcher, config))
    }

    pub fn with_config(
        layout: CertDirLayout,
        store: Arc<dyn ConfigStore>,
        fetcher: Arc<dyn Fetch>,
        config: RotationConfig,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            layout,
            store,
            fetcher,
            rotation_guard: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &CertDirLayout {
        &self.layout
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.layout.bundle_path()
    }

    /// Copy of the current configuration
    pub fn config(&self) -> RotationConfig {
        self.lock_config().clone()
    }

    /// Modify the configuration in place; persisted only by [`save`](Self::save)
    pub fn update_config(&self, update: impl FnOnce(&mut RotationConfig)) {
        let mut config = self.lock_config();
        let last_rotation = config.last_rotation;
        update(&mut config);
        if config.last_rotation < last_rotation {
            tracing::warn!("Ignoring attempt to move last_rotation backwards");
            config.last_rotation = last_rotation;
        }
    }

    /// Persist the configuration under `ssl_rotation_config`
    pub fn save(&self) -> Result<(), StoreError> {
        let config = self.config();
        save_record(self.store.as_ref(), ROTATION_CONFIG_KEY, &config)
    }

    /// Whether the bundle is due for replacement
    pub fn needs_rotation(&self) -> bool {
        let config = self.config();
        if config.last_rotation <= 0 {
            tracing::info!("CA bundle has never been rotated");
            return true;
        }

        let elapsed = Utc::now().timestamp() - config.last_rotation;
        if elapsed >= i64::from(config.rotation_interval_days) * SECONDS_PER_DAY {
            tracing::info!(
                elapsed_days = elapsed / SECONDS_PER_DAY,
                interval_days = config.rotation_interval_days,
                "CA bundle rotation interval elapsed"
            );
            return true;
        }

        if !is_readable_file(&self.bundle_path()) {
            tracing::info!(bundle = %self.bundle_path().display(), "CA bundle missing or unreadable");
            return true;
        }

        self.has_near_expiring_certificates()
    }

    /// Whether a self-signed root in the bundle expires within the threshold
    pub fn has_near_expiring_certificates(&self) -> bool {
        let threshold = self.config().expiration_threshold_days;
        let text = match fs::read_to_string(self.bundle_path()) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read CA bundle for expiry analysis");
                return false;
            }
        };
        let expiring = near_expiring_roots(&text, threshold, Utc::now().timestamp());
        for root in &expiring {
            tracing::info!(
                root = %root.common_name,
                not_after = root.not_after,
                threshold_days = threshold,
                "Root certificate nearing expiry"
            );
        }
        !expiring.is_empty()
    }

    /// Rotate if due (or `force`), returning whether the bundle is current
    ///
    /// On any failure the installed bundle is left untouched.
    pub fn rotate_certificates(&self, force: bool) -> bool {
        if !force && !self.needs_rotation() {
            tracing::debug!("CA bundle rotation not needed");
            return true;
        }

        match self.rotate_locked() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "CA bundle rotation failed");
                false
            }
        }
    }

    fn rotate_locked(&self) -> Result<(), RotationError> {
        let _guard = match self.rotation_guard.try_lock() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::Poisoned(poisoned)) => {
                tracing::warn!("Rotation mutex poisoned, recovering");
                poisoned.into_inner()
            }
            Err(std::sync::TryLockError::WouldBlock) => {
                return Err(RotationError::LockHeld(self.layout.lock_path()));
            }
        };
        self.layout.ensure().map_err(|source| RotationError::Persistence {
            path: self.layout.root().to_path_buf(),
            source,
        })?;
        let _lock = RotationLock::acquire(self.layout.lock_path())?;

        let config = self.config();
        if config.backup_enabled
            && let Err(e) = backup::backup_bundle(&self.layout)
        {
            tracing::warn!(error = %e, "Failed to back up CA bundle, continuing");
        }

        let content = self
            .fetch_certificates_from_sources()
            .ok_or(RotationError::AllSourcesFailed)?;
        self.install_bundle(&content)?;

        let mut config = self.lock_config();
        config.mark_rotated(Utc::now().timestamp());
        let snapshot = config.clone();
        drop(config);
        if let Err(e) = save_record(self.store.as_ref(), ROTATION_CONFIG_KEY, &snapshot) {
            tracing::error!(error = %e, "Installed new CA bundle but failed to persist rotation time");
        }

        if let Err(e) = backup::cleanup_old_backups(&self.layout, snapshot.retention_count) {
            tracing::warn!(error = %e, "Backup cleanup failed");
        }

        tracing::info!(
            certificates = count_certificate_markers(&content),
            bytes = content.len(),
            bundle = %self.bundle_path().display(),
            "CA bundle rotated"
        );
        Ok(())
    }

    /// Write `content` to the staging file, then rename it over the bundle
    fn install_bundle(&self, content: &str) -> Result<(), RotationError> {
        let staging = self.layout.staging_path();
        let bundle = self.bundle_path();
        let mut file = fs::File::create(&staging).map_err(persistence(&staging))?;
        file.write_all(content.as_bytes()).map_err(persistence(&staging))?;
        file.sync_all().map_err(persistence(&staging))?;
        drop(file);

        if let Err(e) = fs::rename(&staging, &bundle) {
            let _ = fs::remove_file(&staging);
            return Err(RotationError::Persistence { path: bundle, source: e });
        }

        if let Err(e) = make_world_readable(&bundle) {
            tracing::warn!(error = %e, "CA bundle may not be readable by other users");
        }
        Ok(())
    }

    /// Fetch the first acceptable bundle, trying sources by ascending priority
    pub fn fetch_certificates_from_sources(&self) -> Option<String> {
        let config = self.config();
        for source in config.ordered_sources() {
            match self.fetch_source(source) {
                Ok(bundle) => {
                    tracing::info!(source = %source.id, "Fetched CA bundle");
                    return Some(bundle);
                }
                Err(e) => tracing::warn!(source = %source.id, error = %e, "Skipping certificate source"),
            }
        }
        tracing::error!("No certificate source produced a valid bundle");
        None
    }

    fn fetch_source(&self, source: &CertificateSource) -> Result<String, RotationError> {
        let rejected = |reason: String| RotationError::SourceFetch {
            source_id: source.id.clone(),
            reason,
        };

        let options = FetchOptions::new(SOURCE_FETCH_TIMEOUT).with_verify_peer(true);
        let response = self
            .fetcher
            .fetch(&source.url, &options)
            .map_err(|e| rejected(e.to_string()))?;
        if response.status != http::StatusCode::OK {
            return Err(rejected(format!("HTTP {}", response.status)));
        }
        if response.body.is_empty() {
            return Err(rejected("empty response".to_string()));
        }

        let text = String::from_utf8_lossy(&response.body);
        let markers = count_certificate_markers(&text);
        if markers < MIN_BUNDLE_CERTIFICATES {
            return Err(rejected(
                RotationError::BundleValidation {
                    found: markers,
                    required: MIN_BUNDLE_CERTIFICATES,
                }
                .to_string(),
            ));
        }

        let certificates = extract_certificates(&text);
        if certificates.len() < MIN_BUNDLE_CERTIFICATES {
            return Err(rejected(
                RotationError::BundleValidation {
                    found: certificates.len(),
                    required: MIN_BUNDLE_CERTIFICATES,
                }
                .to_string(),
            ));
        }
        Ok(assemble_bundle(source, &certificates, Utc::now()))
    }

    /// Delete backups beyond the retention count, returning how many were removed
    pub fn cleanup_old_backups(&self) -> usize {
        match backup::cleanup_old_backups(&self.layout, self.config().retention_count) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(error = %e, "Backup cleanup failed");
                0
            }
        }
    }

    /// Backups oldest first
    pub fn list_backups(&self) -> Vec<BackupInfo> {
        backup::list_backups(&self.layout).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not list CA bundle backups");
            Vec::new()
        })
    }

    /// Reinstall a backup as the active bundle
    ///
    /// The current bundle is backed up first when backups are enabled.
    /// `last_rotation` is left unchanged.
    pub fn restore_backup(&self, path: &Path) -> Result<(), RotationError> {
        if !backup::is_backup_of(&self.layout, path) {
            return Err(RotationError::Persistence {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "not a backup in the certificate directory",
                ),
            });
        }
        let content = fs::read_to_string(path).map_err(|source| RotationError::Persistence {
            path: path.to_path_buf(),
            source,
        })?;
        let found = count_certificate_markers(&content);
        if found == 0 {
            return Err(RotationError::BundleValidation { found, required: 1 });
        }

        let _guard = self
            .rotation_guard
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let _lock = RotationLock::acquire(self.layout.lock_path())?;
        if self.config().backup_enabled
            && let Err(e) = backup::backup_bundle(&self.layout)
        {
            tracing::warn!(error = %e, "Failed to back up CA bundle before restore");
        }
        self.install_bundle(&content)?;
        tracing::info!(backup = %path.display(), certificates = found, "Restored CA bundle from backup");
        Ok(())
    }

    /// Current rotation state
    pub fn rotation_status(&self) -> RotationStatus {
        let config = self.config();
        let bundle_path = self.bundle_path();
        let bundle_text = fs::read_to_string(&bundle_path).ok();
        let last_rotation = (config.last_rotation > 0)
            .then(|| DateTime::from_timestamp(config.last_rotation, 0))
            .flatten();
        let next_rotation_due = last_rotation.map(|last| {
            last + chrono::Duration::days(i64::from(config.rotation_interval_days))
        });

        RotationStatus {
            last_rotation,
            next_rotation_due,
            needs_rotation: self.needs_rotation(),
            bundle_size: bundle_text.as_ref().map(|text| text.len() as u64),
            certificate_count: bundle_text.as_deref().map_or(0, count_certificate_markers),
            bundle_path,
            backups: self.list_backups(),
        }
    }

    fn lock_config(&self) -> MutexGuard<'_, RotationConfig> {
        match self.config.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!(target: "sslguard::rotation", "Rotation config mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn persistence(path: &Path) -> impl FnOnce(std::io::Error) -> RotationError {
    let path = path.to_path_buf();
    move |source| RotationError::Persistence { path, source }
}
