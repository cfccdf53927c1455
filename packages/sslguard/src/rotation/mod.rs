//! CA bundle rotation
//!
//! [`CertificateRotation`] replaces `<cert-dir>/ca-bundle.pem` with a fresh
//! bundle from the first acceptable [`CertificateSource`], keeping
//! timestamped backups of what it replaces. The replacement runs under an
//! in-process mutex and an advisory lock file so concurrent rotations never
//! interleave.

pub mod backup;
pub mod bundle;
pub mod config;
pub mod lock;
pub mod manager;
pub mod permissions;

pub use backup::BackupInfo;
pub use bundle::{ExpiringRoot, MIN_BUNDLE_CERTIFICATES};
pub use config::{CertificateSource, RotationConfig, default_sources};
pub use lock::{RotationLock, STALE_LOCK_AGE};
pub use manager::{CertificateRotation, RotationStatus, SOURCE_FETCH_TIMEOUT};
