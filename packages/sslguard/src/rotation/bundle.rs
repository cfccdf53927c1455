//! CA bundle text processing and expiry analysis

use chrono::{DateTime, SecondsFormat, Utc};
use pem::{EncodeConfig, LineEnding, Pem};
use x509_parser::prelude::{FromDer, X509Certificate, X509Name};

use super::config::CertificateSource;

/// Minimum certificate blocks a fetched bundle must contain
pub const MIN_BUNDLE_CERTIFICATES: usize = 50;

const BEGIN_MARKER: &str = "-----BEGIN CERTIFICATE-----";
const END_MARKER: &str = "-----END CERTIFICATE-----";
const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Count `BEGIN CERTIFICATE` markers without decoding anything
pub fn count_certificate_markers(text: &str) -> usize {
    text.matches(BEGIN_MARKER).count()
}

/// Extract every decodable certificate block, in order
///
/// Line endings are normalized first; blocks whose base64 does not decode
/// are skipped.
pub fn extract_certificates(text: &str) -> Vec<Pem> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut certificates = Vec::new();
    let mut rest = normalized.as_str();

    while let Some(start) = rest.find(BEGIN_MARKER) {
        let block = &rest[start..];
        let Some(end) = block.find(END_MARKER) else {
            break;
        };
        let block_end = end + END_MARKER.len();
        match pem::parse(&block[..block_end]) {
            Ok(parsed) if parsed.tag() == CERTIFICATE_TAG => certificates.push(parsed),
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Skipping undecodable certificate block"),
        }
        rest = &block[block_end..];
    }

    certificates
}

/// Re-encode certificates with LF endings and 64-column lines under a metadata header
pub fn assemble_bundle(
    source: &CertificateSource,
    certificates: &[Pem],
    retrieved: DateTime<Utc>,
) -> String {
    let config = EncodeConfig::new().set_line_ending(LineEnding::LF);
    let mut bundle = format!(
        "##\n\
         ## CA certificate bundle\n\
         ## Source: {} ({})\n\
         ## Retrieved: {}\n\
         ## Certificates: {}\n\
         ##\n\n",
        source.display_name,
        source.url,
        retrieved.to_rfc3339_opts(SecondsFormat::Secs, true),
        certificates.len(),
    );
    for certificate in certificates {
        bundle.push_str(&pem::encode_config(certificate, config));
        bundle.push('\n');
    }
    bundle
}

/// A self-signed root whose validity ends within the threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiringRoot {
    pub common_name: String,
    /// Unix seconds
    pub not_after: i64,
}

/// Roots in `bundle` expiring before `now + threshold_days`
///
/// A certificate counts as a root when its subject and issuer common names
/// are equal. Certificates without a common name are ignored.
pub fn near_expiring_roots(bundle: &str, threshold_days: u32, now: i64) -> Vec<ExpiringRoot> {
    let deadline = now.saturating_add(i64::from(threshold_days) * 86_400);
    extract_certificates(bundle)
        .iter()
        .filter_map(|block| {
            let (_, certificate) = X509Certificate::from_der(block.contents()).ok()?;
            let subject = common_name(certificate.subject())?;
            let issuer = common_name(certificate.issuer())?;
            if subject != issuer {
                return None;
            }
            let not_after = certificate.validity().not_after.timestamp();
            (not_after < deadline).then_some(ExpiringRoot {
                common_name: subject,
                not_after,
            })
        })
        .collect()
}

fn common_name(name: &X509Name<'_>) -> Option<String> {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use chrono::Datelike;

    use super::*;

    fn certificate_pem(cn: &str, not_after: (i32, u8, u8)) -> String {
        let mut params = rcgen::CertificateParams::new(vec![]).unwrap();
        params.distinguished_name.push(rcgen::DnType::CommonName, cn);
        params.not_before = rcgen::date_time_ymd(2020, 1, 1);
        params.not_after = rcgen::date_time_ymd(not_after.0, not_after.1, not_after.2);
        let key = rcgen::KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn extraction_normalizes_and_rewraps() {
        let pem = certificate_pem("Root A", (2040, 1, 1));
        let crlf = format!("# comment\r\n{}", pem.replace('\n', "\r\n"));
        let certificates = extract_certificates(&crlf);
        assert_eq!(certificates.len(), 1);

        let source = CertificateSource::new("test", "https://example.test/ca.pem", "Test", 1);
        let bundle = assemble_bundle(&source, &certificates, Utc::now());
        assert!(bundle.starts_with("##\n"));
        assert!(bundle.contains("## Certificates: 1"));
        assert!(!bundle.contains('\r'));
        assert!(bundle.lines().all(|line| line.len() <= 64 || line.starts_with("##")));
        assert_eq!(count_certificate_markers(&bundle), 1);
    }

    #[test]
    fn malformed_blocks_are_skipped() {
        let good = certificate_pem("Root A", (2040, 1, 1));
        let text = format!("{BEGIN_MARKER}\n!!!not base64!!!\n{END_MARKER}\n{good}");
        assert_eq!(count_certificate_markers(&text), 2);
        assert_eq!(extract_certificates(&text).len(), 1);
    }

    #[test]
    fn finds_roots_expiring_within_threshold() {
        let now = chrono::Utc::now();
        let soon = now + chrono::Duration::days(10);
        let soon_pem = certificate_pem(
            "Expiring Root",
            (soon.year(), soon.month() as u8, soon.day() as u8),
        );
        let later_pem = certificate_pem("Healthy Root", (2099, 1, 1));
        let bundle = format!("{soon_pem}{later_pem}");

        let expiring = near_expiring_roots(&bundle, 30, now.timestamp());
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].common_name, "Expiring Root");
        assert!(near_expiring_roots(&bundle, 1, now.timestamp()).is_empty());
    }
}
