//! Opaque transport configuration surface

use std::path::Path;

use super::debug::DebugSink;

/// TLS protocol versions the transport can be pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl TlsVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

/// Configuration handle for one outbound connection
///
/// Implementations record settings; they decide how (or whether) each maps
/// onto their underlying TLS stack.
pub trait TransportHandle {
    fn set_verify_peer(&mut self, verify: bool);

    fn set_verify_host(&mut self, verify: bool);

    fn set_allow_self_signed(&mut self, allow: bool);

    fn set_verify_depth(&mut self, depth: u32);

    fn set_ca_bundle(&mut self, path: &Path);

    fn set_tls_version(&mut self, version: TlsVersion);

    fn set_client_certificate(&mut self, cert_path: &Path, key_path: Option<&Path>);

    fn set_cipher_list(&mut self, ciphers: &str);

    fn set_revocation_check(&mut self, enabled: bool);

    fn set_proxy(&mut self, proxy: &str);

    fn attach_debug(&mut self, sink: DebugSink);
}
