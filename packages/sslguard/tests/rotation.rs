mod common;

use std::fs::{self, File};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Datelike;
use common::{MockFetch, bundle_with, self_signed_pem};
use http::StatusCode;
use sslguard::rotation::bundle::count_certificate_markers;
use sslguard::{
    CertDirLayout, CertificateRotation, CertificateSource, ConfigStore, FetchResponse, MemoryStore,
    RotationConfig, RotationError, TransportError,
};

const SOURCE_A: &str = "https://a.example/ca.pem";
const SOURCE_B: &str = "https://b.example/ca.pem";

fn two_source_config() -> RotationConfig {
    let mut config = RotationConfig {
        sources: Default::default(),
        ..RotationConfig::default()
    };
    config.add_source(CertificateSource::new("a", SOURCE_A, "Source A", 1));
    config.add_source(CertificateSource::new("b", SOURCE_B, "Source B", 2));
    config
}

fn rotation(
    dir: &tempfile::TempDir,
    fetch: MockFetch,
    config: RotationConfig,
) -> (CertificateRotation, Arc<MockFetch>, Arc<MemoryStore>) {
    let fetch = Arc::new(fetch);
    let store = Arc::new(MemoryStore::new());
    let rotation = CertificateRotation::with_config(
        CertDirLayout::new(dir.path()),
        store.clone(),
        fetch.clone(),
        config,
    );
    (rotation, fetch, store)
}

#[test]
fn failed_fetch_leaves_bundle_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let fetch = MockFetch::new()
        .always(SOURCE_A, FetchResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "oops"))
        .route(SOURCE_B, |_| Err(TransportError::timeout("read timed out")));
    let (rotation, _, store) = rotation(&dir, fetch, two_source_config());

    fs::write(rotation.bundle_path(), "previous bundle").unwrap();
    assert!(!rotation.rotate_certificates(true));
    assert_eq!(fs::read_to_string(rotation.bundle_path()).unwrap(), "previous bundle");
    assert_eq!(rotation.config().last_rotation, 0);
    assert!(store.get("ssl_rotation_config").unwrap().is_none());
}

#[test]
fn rotation_backs_up_previous_bundle_once() {
    let dir = tempfile::tempdir().unwrap();
    let fetch = MockFetch::new().always(SOURCE_A, FetchResponse::ok(bundle_with(60)));
    let (rotation, _, store) = rotation(&dir, fetch, two_source_config());

    fs::write(rotation.bundle_path(), "previous bundle").unwrap();
    assert!(rotation.rotate_certificates(true));

    let backups = rotation.list_backups();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read_to_string(&backups[0].path).unwrap(), "previous bundle");

    let installed = fs::read_to_string(rotation.bundle_path()).unwrap();
    assert!(installed.starts_with("##"));
    assert_eq!(count_certificate_markers(&installed), 60);
    assert!(rotation.config().last_rotation > 0);
    assert!(store.get("ssl_rotation_config").unwrap().is_some());
    assert!(!rotation.layout().lock_path().exists());
}

#[test]
fn bad_source_is_skipped_for_next_priority() {
    let dir = tempfile::tempdir().unwrap();
    let fetch = MockFetch::new()
        .always(SOURCE_A, FetchResponse::ok(bundle_with(10)))
        .always(SOURCE_B, FetchResponse::ok(bundle_with(120)));
    let (rotation, fetch, _) = rotation(&dir, fetch, two_source_config());

    assert!(rotation.rotate_certificates(true));
    assert_eq!(fetch.calls_to(SOURCE_A), 1);
    assert_eq!(fetch.calls_to(SOURCE_B), 1);

    let installed = fs::read_to_string(rotation.bundle_path()).unwrap();
    assert_eq!(count_certificate_markers(&installed), 120);
    assert!(installed.contains("## Source: Source B (https://b.example/ca.pem)"));
}

#[test]
fn sources_are_fetched_with_verification_and_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let fetch = MockFetch::new().always(SOURCE_A, FetchResponse::ok(bundle_with(50)));
    let (rotation, fetch, _) = rotation(&dir, fetch, two_source_config());

    assert!(rotation.fetch_certificates_from_sources().is_some());
    let options = fetch.last_options().unwrap();
    assert!(options.verify_peer);
    assert_eq!(options.timeout, Duration::from_secs(30));
}

#[test]
fn empty_and_non_200_bodies_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let fetch = MockFetch::new()
        .always(SOURCE_A, FetchResponse::ok(""))
        .always(SOURCE_B, FetchResponse::new(StatusCode::NO_CONTENT, bundle_with(60)));
    let (rotation, _, _) = rotation(&dir, fetch, two_source_config());
    assert!(rotation.fetch_certificates_from_sources().is_none());
}

#[test]
fn never_rotated_needs_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let (rotation, _, _) = rotation(&dir, MockFetch::new(), two_source_config());
    assert!(rotation.needs_rotation());
}

#[test]
fn recent_rotation_with_healthy_bundle_is_current() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = two_source_config();
    config.last_rotation = chrono::Utc::now().timestamp();
    let (rotation, fetch, _) = rotation(&dir, MockFetch::new(), config);

    fs::write(rotation.bundle_path(), bundle_with(3)).unwrap();
    assert!(!rotation.needs_rotation());
    assert!(rotation.rotate_certificates(false));
    assert_eq!(fetch.total_calls(), 0);
}

#[test]
fn near_expiring_root_triggers_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = two_source_config();
    config.last_rotation = chrono::Utc::now().timestamp();
    config.expiration_threshold_days = 30;
    let (rotation, _, _) = rotation(&dir, MockFetch::new(), config);

    let soon = chrono::Utc::now() + chrono::Duration::days(5);
    let expiring = self_signed_pem("Expiring Root", (soon.year(), soon.month() as u8, soon.day() as u8));
    fs::write(rotation.bundle_path(), format!("{}{expiring}", bundle_with(2))).unwrap();

    assert!(rotation.has_near_expiring_certificates());
    assert!(rotation.needs_rotation());
}

#[test]
fn missing_bundle_needs_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = two_source_config();
    config.last_rotation = chrono::Utc::now().timestamp();
    let (rotation, _, _) = rotation(&dir, MockFetch::new(), config);
    assert!(rotation.needs_rotation());
}

#[test]
fn elapsed_interval_needs_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = two_source_config();
    config.rotation_interval_days = 7;
    config.last_rotation = chrono::Utc::now().timestamp() - 8 * 86_400;
    let (rotation, _, _) = rotation(&dir, MockFetch::new(), config);
    fs::write(rotation.bundle_path(), bundle_with(3)).unwrap();
    assert!(rotation.needs_rotation());
}

#[test]
fn retention_keeps_most_recent_backups() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = two_source_config();
    config.retention_count = 3;
    let (rotation, _, _) = rotation(&dir, MockFetch::new(), config);

    let layout = rotation.layout().clone();
    let mut paths = Vec::new();
    for i in 0..5u64 {
        let path = layout.backup_path(&format!("2026-01-0{}T00-00-00.000000", i + 1));
        fs::write(&path, format!("backup {i}")).unwrap();
        let modified = SystemTime::now() - Duration::from_secs(1_000 - i * 100);
        File::options().write(true).open(&path).unwrap().set_modified(modified).unwrap();
        paths.push(path);
    }

    assert_eq!(rotation.cleanup_old_backups(), 2);
    let kept: Vec<_> = rotation.list_backups().into_iter().map(|b| b.path).collect();
    assert_eq!(kept, paths[2..]);
}

#[test]
fn held_lock_fails_rotation_without_changes() {
    let dir = tempfile::tempdir().unwrap();
    let fetch = MockFetch::new().always(SOURCE_A, FetchResponse::ok(bundle_with(60)));
    let (rotation, fetch, _) = rotation(&dir, fetch, two_source_config());

    fs::write(rotation.bundle_path(), "previous bundle").unwrap();
    let _held = sslguard::rotation::RotationLock::acquire(rotation.layout().lock_path()).unwrap();

    assert!(!rotation.rotate_certificates(true));
    assert_eq!(fetch.total_calls(), 0);
    assert_eq!(fs::read_to_string(rotation.bundle_path()).unwrap(), "previous bundle");
}

#[test]
fn last_rotation_cannot_be_moved_backwards() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = two_source_config();
    config.last_rotation = 5_000;
    let (rotation, _, _) = rotation(&dir, MockFetch::new(), config);
    rotation.update_config(|config| config.last_rotation = 10);
    assert_eq!(rotation.config().last_rotation, 5_000);
}

#[test]
fn restore_reinstalls_backup() {
    let dir = tempfile::tempdir().unwrap();
    let fetch = MockFetch::new().always(SOURCE_A, FetchResponse::ok(bundle_with(60)));
    let (rotation, _, _) = rotation(&dir, fetch, two_source_config());

    let original = bundle_with(2);
    fs::write(rotation.bundle_path(), &original).unwrap();
    assert!(rotation.rotate_certificates(true));
    let backup = rotation.list_backups().remove(0).path;

    rotation.restore_backup(&backup).unwrap();
    assert_eq!(fs::read_to_string(rotation.bundle_path()).unwrap(), original);
    assert_eq!(rotation.list_backups().len(), 2);

    let outside = dir.path().join("elsewhere.pem");
    fs::write(&outside, &original).unwrap();
    assert!(matches!(
        rotation.restore_backup(&outside),
        Err(RotationError::Persistence { .. })
    ));
}

#[test]
fn status_reports_bundle_and_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let fetch = MockFetch::new().always(SOURCE_A, FetchResponse::ok(bundle_with(55)));
    let (rotation, _, _) = rotation(&dir, fetch, two_source_config());

    let before = rotation.rotation_status();
    assert!(before.last_rotation.is_none());
    assert!(before.needs_rotation);
    assert_eq!(before.certificate_count, 0);

    assert!(rotation.rotate_certificates(false));
    let after = rotation.rotation_status();
    let last = after.last_rotation.unwrap();
    assert_eq!(after.next_rotation_due, Some(last + chrono::Duration::days(30)));
    assert_eq!(after.certificate_count, 55);
    assert!(after.bundle_size.unwrap() > 0);
    assert!(!after.needs_rotation);
}

#[test]
fn config_persists_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let fetch: Arc<MockFetch> = Arc::new(MockFetch::new());
    let store = Arc::new(MemoryStore::new());
    let layout = CertDirLayout::new(dir.path());

    let first = CertificateRotation::new(layout.clone(), store.clone(), fetch.clone()).unwrap();
    first.update_config(|config| config.retention_count = 2);
    first.save().unwrap();

    let second = CertificateRotation::new(layout, store, fetch).unwrap();
    assert_eq!(second.config().retention_count, 2);
    assert_eq!(second.config().sources.len(), 5);
}
