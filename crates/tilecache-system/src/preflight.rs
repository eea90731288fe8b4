//! Startup checks that must pass before the orchestrator can do anything.

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use thiserror::Error;

/// Port the reverse proxy listens on.
pub const HTTPS_PORT: u16 = 443;

const PORT_CHECK_TIMEOUT: Duration = Duration::from_millis(500);

/// Reason the orchestrator cannot run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreflightError {
    #[error("administrator privileges are required")]
    NotElevated,

    #[error("port {0} is already in use; close the program holding it and retry")]
    PortInUse(u16),
}

/// Returns `true` if the current process runs with administrative rights.
#[cfg(target_os = "windows")]
pub fn is_elevated() -> bool {
    // SAFETY: IsUserAnAdmin takes no arguments and only inspects the token.
    unsafe { windows_sys::Win32::UI::Shell::IsUserAnAdmin() != 0 }
}

/// Returns `true` if the current process runs with administrative rights.
#[cfg(unix)]
pub fn is_elevated() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Returns `true` if something accepts connections on `port` locally.
pub fn is_port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpStream::connect_timeout(&addr, PORT_CHECK_TIMEOUT).is_ok()
}

/// Runs every check, returning the first failure.
pub fn check() -> Result<(), PreflightError> {
    if !is_elevated() {
        return Err(PreflightError::NotElevated);
    }
    if is_port_in_use(HTTPS_PORT) {
        return Err(PreflightError::PortInUse(HTTPS_PORT));
    }
    Ok(())
}
