use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A remote CA bundle, tried in ascending `priority` order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSource {
    pub id: String,
    pub url: String,
    pub display_name: String,
    pub priority: u32,
}

impl CertificateSource {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        display_name: impl Into<String>,
        priority: u32,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            display_name: display_name.into(),
            priority,
        }
    }
}

/// Persisted rotation settings and state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    pub rotation_interval_days: u32,
    pub expiration_threshold_days: u32,
    /// Backups kept after cleanup, 0 keeps all
    pub retention_count: u32,
    pub sources: BTreeMap<String, CertificateSource>,
    /// Unix seconds of the last successful rotation, 0 when never rotated
    pub last_rotation: i64,
    pub backup_enabled: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            rotation_interval_days: 30,
            expiration_threshold_days: 30,
            retention_count: 5,
            sources: default_sources(),
            last_rotation: 0,
            backup_enabled: true,
        }
    }
}

impl RotationConfig {
    /// Sources ordered by priority, ties broken by id
    pub fn ordered_sources(&self) -> Vec<&CertificateSource> {
        let mut sources: Vec<_> = self.sources.values().collect();
        sources.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        sources
    }

    /// Advance `last_rotation`, never moving it backwards
    pub fn mark_rotated(&mut self, timestamp: i64) {
        self.last_rotation = self.last_rotation.max(timestamp);
    }

    pub fn add_source(&mut self, source: CertificateSource) {
        self.sources.insert(source.id.clone(), source);
    }
}

/// Built-in bundle sources
pub fn default_sources() -> BTreeMap<String, CertificateSource> {
    [
        CertificateSource::new(
            "mozilla",
            "https://curl.se/ca/cacert.pem",
            "Mozilla CA store (curl extract)",
            10,
        ),
        CertificateSource::new(
            "amazon",
            "https://www.amazontrust.com/repository/cacert.pem",
            "Amazon Trust Services",
            20,
        ),
        CertificateSource::new(
            "digicert",
            "https://cacerts.digicert.com/cacert.pem",
            "DigiCert trusted roots",
            30,
        ),
        CertificateSource::new(
            "ca-bundle",
            "https://raw.githubusercontent.com/bagder/ca-bundle/master/ca-bundle.crt",
            "Vendor-neutral CA bundle",
            40,
        ),
        CertificateSource::new(
            "certifi",
            "https://raw.githubusercontent.com/certifi/python-certifi/master/certifi/cacert.pem",
            "Certifi bundle",
            50,
        ),
    ]
    .into_iter()
    .map(|source| (source.id.clone(), source))
    .collect()
}
