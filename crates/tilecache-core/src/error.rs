//! Error types for the orchestrator and its collaborators.

use std::time::Duration;

use thiserror::Error;

/// Failure of a lifecycle step, reported to the user.
///
/// Each variant is one kind from the user-visible taxonomy. The string carries
/// the underlying detail for logs; the kind is what decides the message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// Trust anchor installation failed.
    #[error("Add certificate failed: {0}")]
    Certificate(String),

    /// Reading the template, rendering, or writing the config failed.
    #[error("Generate nginx file failed: {0}")]
    ConfigGeneration(String),

    /// Applying or restoring hosts overrides failed.
    #[error("Override hosts failed: {0}")]
    HostsOverride(String),

    /// A supervised process could not be launched.
    #[error("Unable to start: {0}")]
    Startup(String),

    /// A supervised process could not be stopped cleanly.
    #[error("Unable to stop: {0}")]
    Shutdown(String),

    /// The upstream server could not be reached.
    #[error("Connection failed, please check: {0}")]
    Connectivity(String),

    /// The cache could not be cleared.
    #[error("Cache clean failed: {0}")]
    CacheClear(String),

    /// Settings could not be saved or loaded.
    #[error("Save settings failed: {0}")]
    Persistence(String),
}

impl LifecycleError {
    /// Returns the kind name, without detail.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Certificate(_) => "CertificateError",
            Self::ConfigGeneration(_) => "ConfigGenerationError",
            Self::HostsOverride(_) => "HostsOverrideError",
            Self::Startup(_) => "StartupError",
            Self::Shutdown(_) => "ShutdownError",
            Self::Connectivity(_) => "ConnectivityError",
            Self::CacheClear(_) => "CacheClearError",
            Self::Persistence(_) => "PersistenceError",
        }
    }
}

/// Error returned by a collaborator.
#[derive(Debug, Error)]
pub enum SystemError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An external command ran but reported failure.
    #[error("{program} failed: {detail}")]
    Command { program: String, detail: String },

    /// A process could not be spawned.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Name resolution failed.
    #[error("failed to resolve {0}")]
    Resolve(String),

    /// HTTP request failed or returned an unexpected status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The operation exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Settings storage failed.
    #[error("storage error: {0}")]
    Persistence(String),

    /// A required file is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Not supported on this platform.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl SystemError {
    /// Builds a [`SystemError::Command`].
    pub fn command(program: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Command {
            program: program.into(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_lead_with_the_kind() {
        let err = LifecycleError::Certificate("certutil exited with 2".into());
        assert_eq!(err.to_string(), "Add certificate failed: certutil exited with 2");
        assert_eq!(err.kind(), "CertificateError");
    }

    #[test]
    fn command_error_display() {
        let err = SystemError::command("taskkill", "exit status 128");
        assert_eq!(err.to_string(), "taskkill failed: exit status 128");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SystemError = io.into();
        assert!(matches!(err, SystemError::Io(_)));
    }
}
