//! Memory + disk certificate cache

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use sha2::{Digest, Sha256};

use super::memory::{MemoryTier, SkipMapTier};
use super::stats::CacheStats;
use crate::config::CertDirLayout;
use crate::error::{self, SetupError};
use crate::tls::bundle_paths::is_readable_file;
use crate::transport::{Fetch, FetchOptions};

/// Default entry lifetime in both tiers
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timeout for loading a certificate from a URL
pub const CERTIFICATE_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

const CACHE_FILE_EXTENSION: &str = "pem";

/// SHA-256 hex digest of a locator
pub fn cache_key(locator: &str) -> String {
    hex::encode(Sha256::digest(locator.as_bytes()))
}

/// Certificate cache over a memory tier and `<cert-dir>/cache/`
pub struct CertificateCache {
    layout: CertDirLayout,
    fetcher: Arc<dyn Fetch>,
    memory: Arc<dyn MemoryTier>,
    ttl: Duration,
}

impl std::fmt::Debug for CertificateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateCache")
            .field("cache_dir", &self.layout.cache_dir())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CertificateCache {
    /// Cache with the default `SkipMap` memory tier
    pub fn new(layout: CertDirLayout, fetcher: Arc<dyn Fetch>, ttl: Duration) -> error::Result<Self> {
        Self::with_memory_tier(layout, fetcher, Arc::new(SkipMapTier::new()), ttl)
    }

    /// Cache over a caller-supplied memory tier
    ///
    /// Fails when `ttl` is zero or the cache directory cannot be created.
    pub fn with_memory_tier(
        layout: CertDirLayout,
        fetcher: Arc<dyn Fetch>,
        memory: Arc<dyn MemoryTier>,
        ttl: Duration,
    ) -> error::Result<Self> {
        if ttl.is_zero() {
            return Err(SetupError::InvalidArgument(
                "certificate cache TTL must be greater than zero".to_string(),
            ));
        }
        fs::create_dir_all(layout.cache_dir())?;
        Ok(Self {
            layout,
            fetcher,
            memory,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Disk location for `locator`
    pub fn disk_path(&self, locator: &str) -> PathBuf {
        self.path_for_key(&cache_key(locator))
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.layout
            .cache_dir()
            .join(format!("{key}.{CACHE_FILE_EXTENSION}"))
    }

    /// Certificate bytes for `locator`, loading on a miss
    ///
    /// `force_refresh` bypasses both tiers. `None` when nothing could be loaded.
    pub fn get_certificate(&self, locator: &str, force_refresh: bool) -> Option<Bytes> {
        let key = cache_key(locator);

        if !force_refresh {
            if let Some(content) = self.memory.get(&key) {
                tracing::debug!(%key, "Certificate cache memory hit");
                return Some(content);
            }
            if let Some(content) = self.read_disk(&key) {
                tracing::debug!(%key, "Certificate cache disk hit");
                self.memory.set(&key, content.clone(), self.ttl);
                return Some(content);
            }
        }

        let content = self.load_certificate(locator)?;
        self.write_through(&key, &content);
        Some(content)
    }

    /// Load from a readable local path or an http(s) URL, bypassing the cache
    pub fn load_certificate(&self, locator: &str) -> Option<Bytes> {
        let path = Path::new(locator);
        if is_readable_file(path) {
            return match fs::read(path) {
                Ok(content) => Some(Bytes::from(content)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read certificate");
                    None
                }
            };
        }

        if !(locator.starts_with("https://") || locator.starts_with("http://")) {
            tracing::warn!(locator, "Certificate locator is neither a readable file nor a URL");
            return None;
        }

        let options = FetchOptions::new(CERTIFICATE_FETCH_TIMEOUT).with_verify_peer(true);
        match self.fetcher.fetch(locator, &options) {
            Ok(response) if response.is_success() && !response.body.is_empty() => Some(response.body),
            Ok(response) => {
                tracing::warn!(locator, status = %response.status, "Certificate download rejected");
                None
            }
            Err(e) => {
                tracing::warn!(locator, error = %e, "Certificate download failed");
                None
            }
        }
    }

    /// Remove one locator from both tiers, or everything when `None`
    pub fn clear_cache(&self, locator: Option<&str>) {
        match locator {
            Some(locator) => {
                let key = cache_key(locator);
                self.memory.delete(&key);
                remove_cache_file(&self.path_for_key(&key));
            }
            None => {
                self.memory.flush();
                for path in self.cache_files() {
                    remove_cache_file(&path);
                }
            }
        }
    }

    /// Count, size and age range of the cached files
    pub fn get_cache_stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for path in self.cache_files() {
            if let Ok(metadata) = fs::metadata(&path) {
                stats.observe(
                    metadata.len(),
                    metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                );
            }
        }
        stats
    }

    fn read_disk(&self, key: &str) -> Option<Bytes> {
        let path = self.path_for_key(key);
        let metadata = fs::metadata(&path).ok()?;
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        if age >= self.ttl {
            tracing::debug!(%key, ?age, "Disk cache entry expired");
            return None;
        }
        match fs::read(&path) {
            Ok(content) => Some(Bytes::from(content)),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Disk cache read failed, reloading");
                None
            }
        }
    }

    fn write_through(&self, key: &str, content: &Bytes) {
        let path = self.path_for_key(key);
        let staging = path.with_extension("pem.tmp");
        if let Err(e) = fs::write(&staging, content).and_then(|()| fs::rename(&staging, &path)) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write certificate cache file");
            remove_cache_file(&staging);
        }
        self.memory.set(key, content.clone(), self.ttl);
    }

    fn cache_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.layout.cache_dir()) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|ext| ext.to_str()) == Some(CACHE_FILE_EXTENSION)
            })
            .collect()
    }
}

fn remove_cache_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove cached certificate"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_sha256_hex() {
        assert_eq!(
            cache_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
