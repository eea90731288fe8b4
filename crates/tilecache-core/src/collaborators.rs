//! Contracts for the collaborators the lifecycle controller drives.
//!
//! The controller owns one boxed implementation of each. The OS-backed
//! implementations live in `tilecache-system` and `tilecache-storage`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;

use crate::error::SystemError;
use crate::settings::Settings;

/// Domain → address it resolved to before any override was applied.
pub type OriginalIps = BTreeMap<String, String>;

/// Loads and persists [`Settings`].
pub trait SettingsStore: Send {
    /// Loads stored settings, or defaults when nothing is stored.
    fn load(&self) -> Result<Settings, SystemError>;

    /// Persists settings.
    fn save(&self, settings: &Settings) -> Result<(), SystemError>;
}

/// Installs the local trust anchor.
pub trait CertificateTruster: Send {
    /// Installs the certificate into the trust store.
    fn install(&self) -> Result<(), SystemError>;
}

/// Redirects domains to localhost and undoes it.
pub trait HostsOverride: Send {
    /// Points every domain in `domains` at localhost.
    fn apply(&mut self, domains: &[String]) -> Result<(), SystemError>;

    /// Removes every override previously applied.
    fn restore(&mut self) -> Result<(), SystemError>;

    /// Returns the pre-override addresses of `domains`.
    ///
    /// Domains that cannot be resolved are left out of the map.
    fn original_ips(&mut self, domains: &[String]) -> Result<OriginalIps, SystemError>;
}

/// Clears the caching collaborator's store.
pub trait CacheAdmin: Send {
    /// Removes all cached tiles.
    fn clear(&self) -> Result<(), SystemError>;
}

/// One-shot reachability check for an upstream server.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Fetches a known tile from `server`, through `proxy` when given.
    ///
    /// Returns the round-trip time.
    async fn probe(&self, server: &str, proxy: Option<&str>) -> Result<Duration, SystemError>;
}

/// Parameters the cache server is launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheServerLaunch {
    pub cache_size_bytes: u64,
    pub proxy_url: Option<String>,
    pub selected_server: String,
}

impl From<&Settings> for CacheServerLaunch {
    fn from(settings: &Settings) -> Self {
        Self {
            cache_size_bytes: settings.cache_size_bytes,
            proxy_url: settings.proxy().map(str::to_string),
            selected_server: settings.selected_server.clone(),
        }
    }
}

/// Reference to a supervised OS process.
#[derive(Debug)]
pub struct ProcessHandle {
    label: String,
    pid: Option<u32>,
    child: Option<Child>,
}

impl ProcessHandle {
    /// Wraps a spawned child.
    pub fn from_child(label: impl Into<String>, child: Child) -> Self {
        Self {
            label: label.into(),
            pid: child.id(),
            child: Some(child),
        }
    }

    /// Creates a handle with no child attached.
    pub fn detached(label: impl Into<String>, pid: Option<u32>) -> Self {
        Self {
            label: label.into(),
            pid,
            child: None,
        }
    }

    /// Returns the label the process was started under.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the OS process id at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns the child, if one is attached.
    pub fn child_mut(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }
}

/// Starts and stops the cache server and the reverse proxy.
#[async_trait]
pub trait Supervisor: Send {
    /// Spawns the cache server as an independent process.
    async fn start_cache_server(
        &mut self,
        launch: &CacheServerLaunch,
    ) -> Result<ProcessHandle, SystemError>;

    /// Spawns the reverse proxy in its working directory.
    async fn start_reverse_proxy(&mut self) -> Result<ProcessHandle, SystemError>;

    /// Terminates the cache server immediately.
    async fn stop_cache_server(&mut self, handle: ProcessHandle) -> Result<(), SystemError>;

    /// Terminates the reverse proxy by process name, then waits a bounded
    /// time for `handle` to exit.
    async fn stop_reverse_proxy(&mut self, handle: ProcessHandle) -> Result<(), SystemError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_from_settings_omits_empty_proxy() {
        let launch = CacheServerLaunch::from(&Settings::default());
        assert!(launch.proxy_url.is_none());
        assert_eq!(launch.selected_server, crate::DEFAULT_SERVER);
    }

    #[test]
    fn launch_from_settings_carries_proxy() {
        let mut settings = Settings::default();
        settings.set_proxy_url("socks5h://10.0.0.2:1080").unwrap();
        let launch = CacheServerLaunch::from(&settings);
        assert_eq!(launch.proxy_url.as_deref(), Some("socks5h://10.0.0.2:1080"));
    }

    #[test]
    fn detached_handle_has_no_child() {
        let mut handle = ProcessHandle::detached("reverse-proxy", Some(42));
        assert_eq!(handle.label(), "reverse-proxy");
        assert_eq!(handle.pid(), Some(42));
        assert!(handle.child_mut().is_none());
    }
}
