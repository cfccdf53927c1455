//! Making installed bundles world-readable

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::RotationError;

/// Make the installed bundle world-readable (0644)
///
/// Tries a direct permission change, then `chmod`, then non-interactive
/// `sudo chmod`. Windows has no equivalent and always succeeds.
pub fn make_world_readable(path: &Path) -> Result<(), RotationError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        match std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)) {
            Ok(()) => return Ok(()),
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "Direct chmod failed"),
        }
    }

    if cfg!(windows) {
        return Ok(());
    }

    let attempts: [&[&str]; 2] = [&["chmod", "644"], &["sudo", "-n", "chmod", "644"]];
    for argv in attempts {
        let status = Command::new(argv[0])
            .args(&argv[1..])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => tracing::debug!(command = argv[0], %status, "chmod fallback failed"),
            Err(e) => tracing::debug!(command = argv[0], error = %e, "chmod fallback unavailable"),
        }
    }

    Err(RotationError::Permission(path.to_path_buf()))
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn sets_mode_644() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.pem");
        std::fs::write(&path, "x").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        make_world_readable(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
