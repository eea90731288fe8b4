//! Tilecache Core - settings, config rendering, and collaborator contracts.
//!
//! This crate holds everything the lifecycle orchestrator needs that does not
//! touch the operating system directly:
//!
//! - User [`Settings`] and their validation
//! - The fixed upstream server set and intercepted domain set
//! - The reverse-proxy config transform ([`render`], [`ConfigGenerator`])
//! - The error taxonomy surfaced to the user ([`LifecycleError`])
//! - The traits the orchestrator drives ([`collaborators`])
//!
//! ## Config rendering
//!
//! ```text
//! nginx.conf.template ──► strip disabled #feature# tokens
//!                                   │
//!                                   ▼
//!                         substitute #domain# → original IP
//!                                   │
//!                                   ▼
//!                             nginx/conf/nginx.conf
//! ```

pub mod collaborators;
mod domains;
mod error;
mod settings;
mod state;
pub mod template;

pub use collaborators::{
    CacheAdmin, CacheServerLaunch, CertificateTruster, ConnectivityProbe, HostsOverride,
    OriginalIps, ProcessHandle, SettingsStore, Supervisor,
};
pub use domains::{intercepted_domains, INTERCEPTED_DOMAINS};
pub use error::{LifecycleError, SystemError};
pub use settings::{
    validate_proxy_url, Settings, SettingsError, DEFAULT_CACHE_SIZE_BYTES, DEFAULT_SERVER,
    UPSTREAM_SERVERS,
};
pub use state::LifecycleState;
pub use template::{default_feature_flags, render, ConfigGenerator, FeatureFlags};
