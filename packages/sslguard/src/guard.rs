//! Wiring of all four components from one certificate directory

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::cache::{CertificateCache, DEFAULT_CACHE_TTL};
use crate::config::{CertDirLayout, ConfigStore, FileStore};
use crate::error;
use crate::retry::{RetryingFetcher, Sleeper, SslTimeoutManager};
use crate::rotation::CertificateRotation;
use crate::tls::SslConfigManager;
use crate::transport::Fetch;

/// Builder for [`SslGuard`]
///
/// Only the certificate directory is required. The store defaults to a
/// [`FileStore`] under `<cert-dir>/config`, the fetcher to an
/// [`HttpsFetcher`](crate::transport::HttpsFetcher) configured from the
/// loaded TLS options.
#[must_use]
pub struct SslGuardBuilder {
    cert_dir: PathBuf,
    plugin_root: Option<PathBuf>,
    store: Option<Arc<dyn ConfigStore>>,
    fetcher: Option<Arc<dyn Fetch>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    ssl_overrides: Vec<(String, Value)>,
    cache_ttl: Duration,
}

impl SslGuardBuilder {
    pub fn new(cert_dir: impl Into<PathBuf>) -> Self {
        Self {
            cert_dir: cert_dir.into(),
            plugin_root: None,
            store: None,
            fetcher: None,
            sleeper: None,
            ssl_overrides: Vec::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Root searched for bundled CA files, defaults to the certificate directory
    pub fn plugin_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.plugin_root = Some(root.into());
        self
    }

    pub fn store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Underlying fetcher; it is wrapped in a [`RetryingFetcher`] either way
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// TLS option applied over the persisted record
    pub fn ssl_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ssl_overrides.push((key.into(), value.into()));
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn build(self) -> error::Result<SslGuard> {
        let layout = CertDirLayout::new(self.cert_dir);
        layout.ensure()?;

        let store: Arc<dyn ConfigStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::open(layout.config_dir())?),
        };
        let plugin_root = self
            .plugin_root
            .unwrap_or_else(|| layout.root().to_path_buf());
        let ssl_config = SslConfigManager::new(store.clone(), plugin_root, self.ssl_overrides)?;

        let mut timeouts = SslTimeoutManager::new(store.clone())?;
        if let Some(sleeper) = self.sleeper {
            timeouts = timeouts.with_sleeper(sleeper);
        }
        let timeouts = Arc::new(timeouts);

        let base: Arc<dyn Fetch> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ssl_config.configured_fetcher(false)),
        };
        let fetcher: Arc<dyn Fetch> = Arc::new(RetryingFetcher::new(base, timeouts.clone()));

        let rotation = CertificateRotation::new(layout.clone(), store.clone(), fetcher.clone())?;
        let cache = CertificateCache::new(layout, fetcher.clone(), self.cache_ttl)?;

        tracing::debug!(cert_dir = %rotation.layout().root().display(), "SSL guard initialized");
        Ok(SslGuard {
            rotation,
            ssl_config,
            cache,
            timeouts,
            fetcher,
            store,
        })
    }
}

/// The rotation, TLS options, cache and retry components sharing one store
pub struct SslGuard {
    rotation: CertificateRotation,
    ssl_config: SslConfigManager,
    cache: CertificateCache,
    timeouts: Arc<SslTimeoutManager>,
    fetcher: Arc<dyn Fetch>,
    store: Arc<dyn ConfigStore>,
}

impl std::fmt::Debug for SslGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslGuard")
            .field("rotation", &self.rotation)
            .field("ssl_config", &self.ssl_config)
            .field("cache", &self.cache)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl SslGuard {
    pub fn builder(cert_dir: impl Into<PathBuf>) -> SslGuardBuilder {
        SslGuardBuilder::new(cert_dir)
    }

    pub fn rotation(&self) -> &CertificateRotation {
        &self.rotation
    }

    pub fn ssl_config(&self) -> &SslConfigManager {
        &self.ssl_config
    }

    pub fn ssl_config_mut(&mut self) -> &mut SslConfigManager {
        &mut self.ssl_config
    }

    pub fn cache(&self) -> &CertificateCache {
        &self.cache
    }

    pub fn timeouts(&self) -> &Arc<SslTimeoutManager> {
        &self.timeouts
    }

    /// Fetcher used by rotation and the cache, with retries applied
    pub fn fetcher(&self) -> &Arc<dyn Fetch> {
        &self.fetcher
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Persist the rotation, TLS option and timeout records
    pub fn save(&self) -> Result<(), crate::error::StoreError> {
        self.rotation.save()?;
        self.ssl_config.save()?;
        self.timeouts.save()
    }
}
