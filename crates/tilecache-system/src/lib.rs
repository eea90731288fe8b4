//! OS-backed collaborators for the Tilecache orchestrator.
//!
//! Each type here implements one of the contracts in
//! [`tilecache_core::collaborators`]:
//!
//! | Type | Contract |
//! |------|----------|
//! | [`HostsFile`] | [`HostsOverride`](tilecache_core::HostsOverride) |
//! | [`SystemTrustStore`] | [`CertificateTruster`](tilecache_core::CertificateTruster) |
//! | [`ProcessSupervisor`] | [`Supervisor`](tilecache_core::Supervisor) |
//! | [`CacheDirectory`] | [`CacheAdmin`](tilecache_core::CacheAdmin) |
//! | [`HttpProbe`] | [`ConnectivityProbe`](tilecache_core::ConnectivityProbe) |
//!
//! [`preflight`] holds the checks run before any of them are used.

mod cache;
mod hosts;
pub mod preflight;
mod probe;
mod supervisor;
mod trust;

pub use cache::CacheDirectory;
pub use hosts::{default_hosts_path, system_resolve, HostsFile, Resolver};
pub use preflight::PreflightError;
pub use probe::{probe_url, HttpProbe, PROBE_TIMEOUT};
pub use supervisor::{
    cache_server_args, CacheServerCommand, ProcessSupervisor, ReverseProxyCommand,
    REVERSE_PROXY_STOP_TIMEOUT,
};
pub use trust::SystemTrustStore;
