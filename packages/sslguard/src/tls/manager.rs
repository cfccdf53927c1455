//! TLS option ownership and application

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::bundle_paths::{PLUGIN_BUNDLE_CANDIDATES, SYSTEM_BUNDLE_CANDIDATES, first_readable, is_readable_file};
use super::options::{SslOptions, map_ssl_version};
use crate::config::{ConfigStore, SSL_OPTIONS_KEY, save_record};
use crate::error::{self, StoreError};
use crate::transport::{DebugCapture, HttpsFetcher, TlsVersion, TransportHandle};

/// Owns one [`SslOptions`] value and applies it to transport handles
pub struct SslConfigManager {
    options: SslOptions,
    store: Arc<dyn ConfigStore>,
    plugin_root: PathBuf,
}

impl std::fmt::Debug for SslConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslConfigManager")
            .field("options", &self.options)
            .field("plugin_root", &self.plugin_root)
            .finish_non_exhaustive()
    }
}

impl SslConfigManager {
    /// Load options: built-in defaults, then the persisted record, then `overrides`
    ///
    /// Each layer only replaces the keys it defines. Unknown keys in either
    /// layer are ignored.
    pub fn new<I>(
        store: Arc<dyn ConfigStore>,
        plugin_root: impl Into<PathBuf>,
        overrides: I,
    ) -> error::Result<Self>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let plugin_root = plugin_root.into();
        let mut manager = Self {
            options: SslOptions::default(),
            store,
            plugin_root,
        };
        manager.options.ca_bundle_path = manager.detect_default_ca_bundle();

        if let Some(Value::Object(persisted)) = manager.store.get(SSL_OPTIONS_KEY)? {
            for (key, value) in persisted {
                manager.set_option(&key, value);
            }
        }
        for (key, value) in overrides {
            manager.set_option(&key, value);
        }

        tracing::debug!(
            verify_peer = manager.options.verify_peer,
            ca_bundle = ?manager.options.ca_bundle_path,
            "SSL configuration loaded"
        );
        Ok(manager)
    }

    /// Load with no constructor overrides
    pub fn load(store: Arc<dyn ConfigStore>, plugin_root: impl Into<PathBuf>) -> error::Result<Self> {
        Self::new(store, plugin_root, std::iter::empty())
    }

    pub fn options(&self) -> &SslOptions {
        &self.options
    }

    /// Persist the current options under `ssl_config_options`
    pub fn save(&self) -> Result<(), StoreError> {
        save_record(self.store.as_ref(), SSL_OPTIONS_KEY, &self.options)
    }

    /// Probe installation-relative then system CA bundle locations
    pub fn detect_default_ca_bundle(&self) -> Option<PathBuf> {
        first_readable(
            PLUGIN_BUNDLE_CANDIDATES
                .iter()
                .map(|relative| self.plugin_root.join(relative)),
        )
        .or_else(|| first_readable(SYSTEM_BUNDLE_CANDIDATES))
    }

    /// Set a known option; unknown keys and mistyped values are ignored
    ///
    /// Returns whether the value was applied.
    pub fn set_option(&mut self, key: &str, value: impl Into<Value>) -> bool {
        let mut record = self.as_map();
        if !record.contains_key(key) {
            tracing::debug!(key, "Ignoring unknown SSL option");
            return false;
        }
        record.insert(key.to_string(), value.into());
        match serde_json::from_value::<SslOptions>(Value::Object(record)) {
            Ok(options) => {
                self.options = options;
                true
            }
            Err(e) => {
                tracing::warn!(key, "Ignoring SSL option with invalid value: {}", e);
                false
            }
        }
    }

    /// Current value of `key`, or `default` when unset or unknown
    pub fn get_option(&self, key: &str, default: Value) -> Value {
        match self.as_map().remove(key) {
            Some(Value::Null) | None => default,
            Some(value) => value,
        }
    }

    fn as_map(&self) -> Map<String, Value> {
        match serde_json::to_value(&self.options) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Whether `path` exists and is readable; no configuration side effects
    pub fn validate_ca_bundle(path: &Path) -> bool {
        if is_readable_file(path) {
            true
        } else {
            tracing::warn!(path = %path.display(), "CA bundle missing or unreadable");
            false
        }
    }

    pub fn map_ssl_version(label: &str) -> Option<TlsVersion> {
        map_ssl_version(label)
    }

    /// Apply the options to `handle`
    ///
    /// The returned capture, present when `debug_ssl` is on, records transport
    /// activity until dropped. Prefer [`with_applied`](Self::with_applied),
    /// which scopes it to one call.
    #[must_use = "dropping the capture ends debug logging for this call"]
    pub fn apply_options(&self, handle: &mut dyn TransportHandle, is_local: bool) -> Option<DebugCapture> {
        let options = &self.options;

        let capture = options.debug_ssl.then(|| {
            let capture = DebugCapture::start("ssl");
            handle.attach_debug(capture.sink());
            capture
        });

        if is_local && options.disable_ssl_local {
            tracing::warn!("Peer verification disabled for local request (disable_ssl_local)");
            handle.set_verify_peer(false);
            handle.set_verify_host(false);
            return capture;
        }

        handle.set_verify_peer(options.verify_peer);
        handle.set_verify_host(options.verify_peer_name);
        handle.set_allow_self_signed(options.allow_self_signed);
        handle.set_verify_depth(options.verify_depth);

        if options.verify_peer
            && let Some(bundle) = &options.ca_bundle_path
            && Self::validate_ca_bundle(bundle)
        {
            handle.set_ca_bundle(bundle);
        }

        if let Some(label) = options.ssl_version.as_deref().filter(|label| !label.is_empty()) {
            match map_ssl_version(label) {
                Some(version) => handle.set_tls_version(version),
                None => tracing::debug!(label, "Skipping unrecognized SSL version label"),
            }
        }

        if let Some(cert) = &options.client_cert_path {
            handle.set_client_certificate(cert, options.client_key_path.as_deref());
        }

        if let Some(ciphers) = options.cipher_list.as_deref().filter(|c| !c.is_empty()) {
            handle.set_cipher_list(ciphers);
        }
        handle.set_revocation_check(options.revocation_check);

        if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.is_empty()) {
            handle.set_proxy(proxy);
        }

        capture
    }

    /// Apply options, run `f` against the handle, then release the debug capture
    pub fn with_applied<H, R>(&self, handle: &mut H, is_local: bool, f: impl FnOnce(&mut H) -> R) -> R
    where
        H: TransportHandle,
    {
        let _capture = self.apply_options(handle, is_local);
        f(handle)
    }

    /// A reference fetcher configured with the current options
    ///
    /// Debug capture is not carried over; use [`with_applied`](Self::with_applied)
    /// around individual calls for that.
    pub fn configured_fetcher(&self, is_local: bool) -> HttpsFetcher {
        let mut fetcher = HttpsFetcher::new();
        drop(self.apply_options(fetcher.settings_mut(), is_local));
        fetcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::transport::TransportSettings;

    fn manager(store: Arc<MemoryStore>, overrides: Vec<(String, Value)>) -> SslConfigManager {
        let root = tempfile::tempdir().unwrap();
        SslConfigManager::new(store, root.path(), overrides).unwrap()
    }

    #[test]
    fn overrides_win_over_persisted_record() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(SSL_OPTIONS_KEY, serde_json::json!({"verify_depth": 3, "debug_ssl": true}))
            .unwrap();
        let manager = manager(store, vec![("verify_depth".into(), Value::from(9))]);
        assert_eq!(manager.options().verify_depth, 9);
        assert!(manager.options().debug_ssl);
    }

    #[test]
    fn unknown_and_mistyped_keys_are_ignored() {
        let mut manager = manager(Arc::new(MemoryStore::new()), vec![]);
        assert!(!manager.set_option("verify_peeer", false));
        assert!(!manager.set_option("verify_depth", "deep"));
        assert!(manager.options().verify_peer);
        assert_eq!(manager.get_option("verify_peeer", Value::from("fallback")), Value::from("fallback"));
        assert_eq!(manager.get_option("proxy", Value::from("none")), Value::from("none"));
    }

    #[test]
    fn local_escape_hatch_disables_verification() {
        let manager = manager(
            Arc::new(MemoryStore::new()),
            vec![("disable_ssl_local".into(), Value::from(true))],
        );
        let mut settings = TransportSettings::default();
        let capture = manager.apply_options(&mut settings, true);
        assert!(capture.is_none());
        assert!(!settings.verify_peer);

        let mut remote = TransportSettings::default();
        let _ = manager.apply_options(&mut remote, false);
        assert!(remote.verify_peer);
    }

    #[test]
    fn debug_capture_is_scoped_to_the_call() {
        let manager = manager(
            Arc::new(MemoryStore::new()),
            vec![("debug_ssl".into(), Value::from(true))],
        );
        let mut settings = TransportSettings::default();
        manager.with_applied(&mut settings, false, |handle| {
            assert!(handle.debug.as_ref().is_some_and(|sink| sink.is_active()));
        });
        assert!(settings.debug.as_ref().is_some_and(|sink| !sink.is_active()));
    }

    #[test]
    fn save_persists_current_options() {
        let store = Arc::new(MemoryStore::new());
        let mut manager = manager(Arc::clone(&store), vec![]);
        manager.set_option("proxy", "http://proxy:3128");
        manager.save().unwrap();
        let stored = store.get(SSL_OPTIONS_KEY).unwrap().unwrap();
        assert_eq!(stored["proxy"], Value::from("http://proxy:3128"));
    }
}
