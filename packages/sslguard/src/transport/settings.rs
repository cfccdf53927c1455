//! Recorded transport settings and their rustls realization

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use super::debug::DebugSink;
use super::handle::{TlsVersion, TransportHandle};
use crate::error::TransportError;

/// Transport settings accumulated through [`TransportHandle`]
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct TransportSettings {
    pub verify_peer: bool,
    pub verify_host: bool,
    pub allow_self_signed: bool,
    /// Maximum number of intermediate certificates accepted in a chain
    pub verify_depth: Option<u32>,
    pub ca_bundle: Option<PathBuf>,
    pub tls_version: Option<TlsVersion>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub cipher_list: Option<String>,
    pub revocation_check: bool,
    pub proxy: Option<String>,
    pub debug: Option<DebugSink>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            verify_peer: true,
            verify_host: true,
            allow_self_signed: false,
            verify_depth: None,
            ca_bundle: None,
            tls_version: None,
            client_cert: None,
            client_key: None,
            cipher_list: None,
            revocation_check: false,
            proxy: None,
            debug: None,
        }
    }
}

impl TransportHandle for TransportSettings {
    fn set_verify_peer(&mut self, verify: bool) {
        self.verify_peer = verify;
    }

    fn set_verify_host(&mut self, verify: bool) {
        self.verify_host = verify;
    }

    fn set_allow_self_signed(&mut self, allow: bool) {
        self.allow_self_signed = allow;
    }

    fn set_verify_depth(&mut self, depth: u32) {
        self.verify_depth = Some(depth);
    }

    fn set_ca_bundle(&mut self, path: &Path) {
        self.ca_bundle = Some(path.to_path_buf());
    }

    fn set_tls_version(&mut self, version: TlsVersion) {
        self.tls_version = Some(version);
    }

    fn set_client_certificate(&mut self, cert_path: &Path, key_path: Option<&Path>) {
        self.client_cert = Some(cert_path.to_path_buf());
        self.client_key = key_path.map(Path::to_path_buf);
    }

    fn set_cipher_list(&mut self, ciphers: &str) {
        self.cipher_list = Some(ciphers.to_string());
    }

    fn set_revocation_check(&mut self, enabled: bool) {
        self.revocation_check = enabled;
    }

    fn set_proxy(&mut self, proxy: &str) {
        self.proxy = Some(proxy.to_string());
    }

    fn attach_debug(&mut self, sink: DebugSink) {
        self.debug = Some(sink);
    }
}

impl TransportSettings {
    /// Record a line in the attached debug capture, if any
    pub fn debug_line(&self, line: impl Into<String>) {
        if let Some(sink) = &self.debug {
            sink.record(line);
        }
    }

    /// Build a rustls client configuration from these settings
    ///
    /// `force_verify` turns peer verification on for this configuration even
    /// when the settings disable it.
    pub fn client_config(&self, force_verify: bool) -> Result<ClientConfig, TransportError> {
        let provider = Arc::new(self.crypto_provider());
        let versions: Vec<&'static rustls::SupportedProtocolVersion> = match self.tls_version {
            Some(TlsVersion::Tls12) => vec![&rustls::version::TLS12],
            Some(TlsVersion::Tls13) => vec![&rustls::version::TLS13],
            None => rustls::DEFAULT_VERSIONS.to_vec(),
        };

        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(&versions)
            .map_err(|e| TransportError::tls(format!("Unsupported TLS version/cipher combination: {e}")))?;

        let verify_peer = self.verify_peer || force_verify;
        let inner = if verify_peer {
            let roots = Arc::new(self.root_store()?);
            let verifier = WebPkiServerVerifier::builder_with_provider(roots, Arc::clone(&provider))
                .build()
                .map_err(|e| TransportError::tls(format!("Failed to create certificate verifier: {e}")))?;
            Some(verifier)
        } else {
            self.debug_line("peer verification disabled");
            None
        };

        if self.revocation_check {
            self.debug_line("revocation check requested");
        }

        let verifier = Arc::new(OptionsVerifier {
            inner,
            provider,
            verify_host: self.verify_host,
            allow_self_signed: self.allow_self_signed,
            verify_depth: self.verify_depth,
            debug: self.debug.clone(),
        });

        let builder = builder.dangerous().with_custom_certificate_verifier(verifier);

        match &self.client_cert {
            Some(cert_path) => {
                let certs = load_certs(cert_path)?;
                let key_path = self.client_key.as_deref().unwrap_or(cert_path);
                let key = load_private_key(key_path)?;
                self.debug_line(format!("presenting client certificate {}", cert_path.display()));
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(|e| TransportError::tls(format!("Invalid client certificate: {e}")))
            }
            None => Ok(builder.with_no_client_auth()),
        }
    }

    /// Ring provider restricted to the configured cipher list
    ///
    /// Names are matched against IANA suite names (`TLS_AES_128_GCM_SHA256`,
    /// `TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256`), separated by `:`, `,` or
    /// spaces. Unknown names are skipped; an empty selection keeps the defaults.
    fn crypto_provider(&self) -> CryptoProvider {
        let mut provider = rustls::crypto::ring::default_provider();
        let Some(list) = &self.cipher_list else {
            return provider;
        };

        let wanted: Vec<String> = list
            .split([':', ',', ' '])
            .filter(|name| !name.is_empty())
            .map(normalize_cipher_name)
            .collect();

        let selected: Vec<_> = provider
            .cipher_suites
            .iter()
            .filter(|suite| wanted.contains(&normalize_cipher_name(&format!("{:?}", suite.suite()))))
            .cloned()
            .collect();

        if selected.is_empty() {
            tracing::warn!(cipher_list = %list, "No supported cipher suites in configured list, using defaults");
        } else {
            self.debug_line(format!("restricting to {} cipher suites", selected.len()));
            provider.cipher_suites = selected;
        }
        provider
    }

    fn root_store(&self) -> Result<RootCertStore, TransportError> {
        let mut root_store = RootCertStore::empty();

        if let Some(bundle) = &self.ca_bundle {
            let certs = load_certs(bundle)?;
            let (added, ignored) = root_store.add_parsable_certificates(certs);
            self.debug_line(format!(
                "loaded {added} trust anchors from {} ({ignored} ignored)",
                bundle.display()
            ));
            if added == 0 {
                return Err(TransportError::tls(format!(
                    "CA bundle {} contains no usable certificates",
                    bundle.display()
                )));
            }
            return Ok(root_store);
        }

        let native = rustls_native_certs::load_native_certs();
        for cert in native.certs {
            if let Err(e) = root_store.add(cert) {
                tracing::warn!("Failed to add system certificate: {}", e);
            }
        }
        if !native.errors.is_empty() || root_store.is_empty() {
            for err in &native.errors {
                tracing::warn!("Certificate load error: {}", err);
            }
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        self.debug_line(format!("loaded {} system trust anchors", root_store.len()));
        Ok(root_store)
    }
}

fn normalize_cipher_name(name: &str) -> String {
    let upper = name.trim().to_ascii_uppercase().replace('-', "_");
    match upper.strip_prefix("TLS13_") {
        Some(rest) => format!("TLS_{rest}"),
        None => upper,
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let file = File::open(path)
        .map_err(|e| TransportError::tls(format!("Cannot open certificate file {}: {e}", path.display())))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .filter_map(Result::ok)
        .collect();
    if certs.is_empty() {
        return Err(TransportError::tls(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let file = File::open(path)
        .map_err(|e| TransportError::tls(format!("Cannot open key file {}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TransportError::tls(format!("Failed to read key file {}: {e}", path.display())))?
        .ok_or_else(|| TransportError::tls(format!("No private key found in {}", path.display())))
}

fn is_self_signed(der: &[u8]) -> bool {
    match x509_parser::parse_x509_certificate(der) {
        Ok((_, cert)) => cert.subject().as_raw() == cert.issuer().as_raw(),
        Err(_) => false,
    }
}

// Newer rustls releases split the name mismatch into a context-carrying variant
fn is_name_mismatch(error: &CertificateError) -> bool {
    format!("{error:?}").starts_with("NotValidForName")
}

/// Verifier applying host/self-signed/depth relaxations on top of webpki
#[derive(Debug)]
struct OptionsVerifier {
    inner: Option<Arc<WebPkiServerVerifier>>,
    provider: Arc<CryptoProvider>,
    verify_host: bool,
    allow_self_signed: bool,
    verify_depth: Option<u32>,
    debug: Option<DebugSink>,
}

impl OptionsVerifier {
    fn note(&self, line: String) {
        if let Some(sink) = &self.debug {
            sink.record(line);
        }
    }
}

impl ServerCertVerifier for OptionsVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if let Some(depth) = self.verify_depth
            && intermediates.len() > depth as usize
        {
            return Err(rustls::Error::General(format!(
                "certificate chain has {} intermediates, verify depth is {depth}",
                intermediates.len()
            )));
        }

        let Some(inner) = &self.inner else {
            return Ok(ServerCertVerified::assertion());
        };

        match inner.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now) {
            Ok(verified) => {
                self.note(format!("peer certificate verified for {server_name:?}"));
                Ok(verified)
            }
            Err(rustls::Error::InvalidCertificate(ref e)) if !self.verify_host && is_name_mismatch(e) => {
                self.note(format!("ignoring host name mismatch for {server_name:?}"));
                Ok(ServerCertVerified::assertion())
            }
            Err(rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer))
                if self.allow_self_signed && is_self_signed(end_entity.as_ref()) =>
            {
                self.note(format!("accepting self-signed certificate for {server_name:?}"));
                Ok(ServerCertVerified::assertion())
            }
            Err(e) => {
                self.note(format!("peer verification failed for {server_name:?}: {e}"));
                Err(e)
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cipher_names_normalize_to_iana_form() {
        assert_eq!(normalize_cipher_name("tls13-aes-128-gcm-sha256"), "TLS_AES_128_GCM_SHA256");
        assert_eq!(
            normalize_cipher_name("TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256"),
            "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256"
        );
    }

    #[test]
    fn cipher_list_restricts_provider() {
        let settings = TransportSettings {
            cipher_list: Some("TLS_AES_256_GCM_SHA384:NOT_A_SUITE".to_string()),
            ..TransportSettings::default()
        };
        let provider = settings.crypto_provider();
        assert_eq!(provider.cipher_suites.len(), 1);
    }

    #[test]
    fn unknown_cipher_list_keeps_defaults() {
        let settings = TransportSettings {
            cipher_list: Some("BOGUS".to_string()),
            ..TransportSettings::default()
        };
        let defaults = rustls::crypto::ring::default_provider().cipher_suites.len();
        assert_eq!(settings.crypto_provider().cipher_suites.len(), defaults);
    }

    #[test]
    fn unverified_config_builds_without_roots() {
        let settings = TransportSettings {
            verify_peer: false,
            tls_version: Some(TlsVersion::Tls13),
            ..TransportSettings::default()
        };
        assert!(settings.client_config(false).is_ok());
    }

    #[test]
    fn missing_ca_bundle_is_a_tls_error() {
        let settings = TransportSettings {
            ca_bundle: Some(PathBuf::from("/nonexistent/ca-bundle.pem")),
            ..TransportSettings::default()
        };
        let err = settings.client_config(true).unwrap_err();
        assert_eq!(err.kind, crate::error::TransportErrorKind::Tls);
    }
}
