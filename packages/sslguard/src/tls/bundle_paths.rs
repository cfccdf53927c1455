//! Well-known CA bundle locations

use std::path::{Path, PathBuf};

/// Bundle locations relative to the installation root, probed first
pub const PLUGIN_BUNDLE_CANDIDATES: &[&str] = &[
    "certs/ca-bundle.pem",
    "certs/cacert.pem",
    "ca-bundle.crt",
];

/// OS-standard system bundle locations, probed in order
pub const SYSTEM_BUNDLE_CANDIDATES: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",                // Debian/Ubuntu/Gentoo
    "/etc/pki/tls/certs/ca-bundle.crt",                  // Fedora/RHEL 6
    "/etc/ssl/ca-bundle.pem",                            // OpenSUSE
    "/etc/pki/tls/cacert.pem",                           // OpenELEC
    "/etc/pki/ca-trust/extracted/pem/tls-ca-bundle.pem", // CentOS/RHEL 7
    "/etc/ssl/cert.pem",                                 // Alpine, macOS
    "/usr/local/etc/openssl/cert.pem",                   // Homebrew
    "/usr/local/share/certs/ca-root-nss.crt",            // FreeBSD
];

/// First candidate that exists and can be opened for reading
pub fn first_readable<I, P>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    candidates
        .into_iter()
        .map(|candidate| candidate.as_ref().to_path_buf())
        .find(|path| is_readable_file(path))
}

pub(crate) fn is_readable_file(path: &Path) -> bool {
    path.is_file() && std::fs::File::open(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_readable_respects_order() {
        let dir = tempfile::tempdir().unwrap();
        let second = dir.path().join("second.pem");
        let third = dir.path().join("third.pem");
        std::fs::write(&second, "x").unwrap();
        std::fs::write(&third, "x").unwrap();

        let found = first_readable([dir.path().join("first.pem"), second.clone(), third]);
        assert_eq!(found, Some(second));
        assert_eq!(first_readable([dir.path().join("none.pem")]), None);
    }
}
