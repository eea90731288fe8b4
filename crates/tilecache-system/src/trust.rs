//! Trust-store installation of the reverse proxy's certificate.
//!
//! The process already runs elevated (see [`crate::preflight`]), so the
//! platform tools are invoked directly without a privilege prompt.

use std::path::{Path, PathBuf};
use std::process::Command;

use tilecache_core::{CertificateTruster, SystemError};
use tracing::{debug, info};

/// File name used when copying into a Linux anchors directory.
#[cfg(target_os = "linux")]
const ANCHOR_FILE_NAME: &str = "tilecache.crt";

/// Installs a certificate into the system trust store.
#[derive(Debug, Clone)]
pub struct SystemTrustStore {
    cert_path: PathBuf,
}

impl SystemTrustStore {
    pub fn new(cert_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
        }
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }
}

impl CertificateTruster for SystemTrustStore {
    fn install(&self) -> Result<(), SystemError> {
        if !self.cert_path.exists() {
            return Err(SystemError::NotFound(format!(
                "certificate at {}",
                self.cert_path.display()
            )));
        }

        install_platform(&self.cert_path)?;
        info!("Certificate {:?} trusted", self.cert_path);
        Ok(())
    }
}

#[cfg(target_os = "windows")]
fn install_platform(cert_path: &Path) -> Result<(), SystemError> {
    let cert = cert_path.to_string_lossy();
    run("certutil", &["-addstore", "-f", "Root", &cert])
}

#[cfg(target_os = "macos")]
fn install_platform(cert_path: &Path) -> Result<(), SystemError> {
    let cert = cert_path.to_string_lossy();
    run(
        "security",
        &[
            "add-trusted-cert",
            "-d",
            "-r",
            "trustRoot",
            "-k",
            "/Library/Keychains/System.keychain",
            &cert,
        ],
    )
}

#[cfg(target_os = "linux")]
fn install_platform(cert_path: &Path) -> Result<(), SystemError> {
    // Anchors directory and refresh command, per distro family
    const STORES: &[(&str, &[&str])] = &[
        ("/usr/local/share/ca-certificates", &["update-ca-certificates"]),
        ("/etc/pki/ca-trust/source/anchors", &["update-ca-trust", "extract"]),
        ("/etc/ca-certificates/trust-source/anchors", &["trust", "extract-compat"]),
    ];

    let (dir, refresh) = STORES
        .iter()
        .find(|(dir, _)| Path::new(dir).exists())
        .ok_or_else(|| SystemError::Unsupported("no known CA anchors directory".into()))?;

    let dest = Path::new(dir).join(ANCHOR_FILE_NAME);
    std::fs::copy(cert_path, &dest)?;
    debug!("Copied certificate to {:?}", dest);

    run(refresh[0], &refresh[1..])
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
fn install_platform(_cert_path: &Path) -> Result<(), SystemError> {
    Err(SystemError::Unsupported("certificate installation".into()))
}

#[cfg_attr(
    not(any(target_os = "windows", target_os = "macos", target_os = "linux")),
    allow(dead_code)
)]
fn run(program: &str, args: &[&str]) -> Result<(), SystemError> {
    debug!("Running {} {:?}", program, args);
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| SystemError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        Err(SystemError::command(
            program,
            format!("{} ({})", output.status, detail),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_certificate_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = SystemTrustStore::new(dir.path().join("cert.crt"));

        let err = store.install().unwrap_err();
        assert!(matches!(err, SystemError::NotFound(_)));
    }

    #[test]
    fn run_reports_missing_program() {
        let err = run("tilecache-no-such-program", &[]).unwrap_err();
        assert!(matches!(err, SystemError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn run_reports_failing_program() {
        let err = run("false", &[]).unwrap_err();
        match err {
            SystemError::Command { program, .. } => assert_eq!(program, "false"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
