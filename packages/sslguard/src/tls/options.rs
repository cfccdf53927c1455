//! Flat TLS option record

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::transport::TlsVersion;

/// Unified TLS connection options, persisted under `ssl_config_options`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SslOptions {
    pub verify_peer: bool,
    pub verify_peer_name: bool,
    pub allow_self_signed: bool,
    pub verify_depth: u32,
    pub cipher_list: Option<String>,
    pub ssl_version: Option<String>,
    pub revocation_check: bool,
    pub ca_bundle_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
    /// Skip peer verification for local requests (development only)
    pub disable_ssl_local: bool,
    pub debug_ssl: bool,
    pub proxy: Option<String>,
}

impl Default for SslOptions {
    fn default() -> Self {
        Self {
            verify_peer: true,
            verify_peer_name: true,
            allow_self_signed: false,
            verify_depth: 5,
            cipher_list: None,
            ssl_version: None,
            revocation_check: false,
            ca_bundle_path: None,
            client_cert_path: None,
            client_key_path: None,
            disable_ssl_local: false,
            debug_ssl: false,
            proxy: None,
        }
    }
}

/// Map a version label onto the transport's version enum
///
/// Accepts `TLSv1.2`, `TLSv1_2`, `tls1.2`, `1.2` and the same forms for 1.3.
/// Anything else, including versions the transport cannot speak, is `None`.
pub fn map_ssl_version(label: &str) -> Option<TlsVersion> {
    let normalized = label.trim().to_ascii_lowercase().replace('_', ".");
    let number = normalized
        .strip_prefix("tlsv")
        .or_else(|| normalized.strip_prefix("tls"))
        .unwrap_or(&normalized);
    match number {
        "1.2" => Some(TlsVersion::Tls12),
        "1.3" => Some(TlsVersion::Tls13),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_mapping_is_closed() {
        assert_eq!(map_ssl_version("TLSv1.2"), Some(TlsVersion::Tls12));
        assert_eq!(map_ssl_version("tlsv1_3"), Some(TlsVersion::Tls13));
        assert_eq!(map_ssl_version("1.3"), Some(TlsVersion::Tls13));
        assert_eq!(map_ssl_version("TLSv1.1"), None);
        assert_eq!(map_ssl_version("SSLv3"), None);
        assert_eq!(map_ssl_version(""), None);
    }

    #[test]
    fn partial_records_fill_defaults() {
        let options: SslOptions = serde_json::from_value(serde_json::json!({"debug_ssl": true})).unwrap();
        assert!(options.debug_ssl);
        assert!(options.verify_peer);
        assert_eq!(options.verify_depth, 5);
    }
}
