//! The lifecycle state machine.
//!
//! Run, Stop, and Quit are each a fixed sequence of [`Step`]s folded into a
//! [`Report`]:
//!
//! | Operation | Steps |
//! |-----------|-------|
//! | Run  | save settings, stop cache server, stop reverse proxy, install certificate, generate config, override hosts, start processes |
//! | Stop | stop cache server, stop reverse proxy |
//! | Quit | save settings, stop cache server, stop reverse proxy, restore hosts |
//!
//! After Run the state is [`LifecycleState::Running`] whatever the step
//! outcomes were, including a failed process start.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tilecache_core::{
    CacheAdmin, CacheServerLaunch, CertificateTruster, ConfigGenerator, ConnectivityProbe,
    HostsOverride, LifecycleError, LifecycleState, ProcessHandle, Settings, SettingsError,
    SettingsStore, Supervisor,
};
use tracing::{debug, error, info, warn};

/// Hard bound on a connectivity test.
pub const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(3);

/// One guarded unit of a lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SaveSettings,
    StopCacheServer,
    StopReverseProxy,
    InstallCertificate,
    GenerateConfig,
    OverrideHosts,
    StartProcesses,
    RestoreHosts,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SaveSettings => "save settings",
            Self::StopCacheServer => "stop cache server",
            Self::StopReverseProxy => "stop reverse proxy",
            Self::InstallCertificate => "install certificate",
            Self::GenerateConfig => "generate config",
            Self::OverrideHosts => "override hosts",
            Self::StartProcesses => "start processes",
            Self::RestoreHosts => "restore hosts",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const RUN_SEQUENCE: &[Step] = &[
    Step::SaveSettings,
    Step::StopCacheServer,
    Step::StopReverseProxy,
    Step::InstallCertificate,
    Step::GenerateConfig,
    Step::OverrideHosts,
    Step::StartProcesses,
];

const STOP_SEQUENCE: &[Step] = &[Step::StopCacheServer, Step::StopReverseProxy];

const QUIT_SEQUENCE: &[Step] = &[
    Step::SaveSettings,
    Step::StopCacheServer,
    Step::StopReverseProxy,
    Step::RestoreHosts,
];

/// Lifecycle operation a [`Report`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Run,
    Stop,
    Quit,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Stop => "stop",
            Self::Quit => "quit",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: Step,
    pub result: Result<(), LifecycleError>,
    pub at: DateTime<Utc>,
}

/// Ordered outcomes of one lifecycle operation.
#[derive(Debug, Clone)]
pub struct Report {
    operation: Operation,
    outcomes: Vec<StepOutcome>,
}

impl Report {
    fn new(operation: Operation) -> Self {
        Self {
            operation,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, step: Step, result: Result<(), LifecycleError>) {
        match &result {
            Ok(()) => debug!("{}: {} ok", self.operation, step),
            Err(e) => warn!("{}: {} failed: {}", self.operation, step, e),
        }
        self.outcomes.push(StepOutcome {
            step,
            result,
            at: Utc::now(),
        });
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Outcomes in execution order.
    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    /// Returns the outcome of `step`, if it ran.
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.step == step)
    }

    /// Errors of the failed steps, in order.
    pub fn failures(&self) -> impl Iterator<Item = &LifecycleError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// The collaborators a controller drives.
pub struct Collaborators {
    pub settings_store: Box<dyn SettingsStore>,
    pub certificate: Box<dyn CertificateTruster>,
    pub hosts: Box<dyn HostsOverride>,
    pub supervisor: Box<dyn Supervisor>,
    pub cache: Box<dyn CacheAdmin>,
    pub probe: Box<dyn ConnectivityProbe>,
}

/// Owns the settings, the lifecycle state, and both process handles.
///
/// Dropping a controller without [`quit`](Self::quit) restores any hosts
/// overrides it may have applied.
pub struct LifecycleController {
    settings: Settings,
    state: LifecycleState,
    cache_server: Option<ProcessHandle>,
    reverse_proxy: Option<ProcessHandle>,
    settings_store: Box<dyn SettingsStore>,
    certificate: Box<dyn CertificateTruster>,
    hosts: Box<dyn HostsOverride>,
    supervisor: Box<dyn Supervisor>,
    cache: Box<dyn CacheAdmin>,
    probe: Box<dyn ConnectivityProbe>,
    generator: ConfigGenerator,
    domains: Vec<String>,
    overrides_pending: bool,
}

impl LifecycleController {
    /// Creates a stopped controller and loads the stored settings.
    ///
    /// Settings that cannot be loaded are replaced by defaults.
    pub fn new(
        collaborators: Collaborators,
        generator: ConfigGenerator,
        domains: Vec<String>,
    ) -> Self {
        let mut settings = match collaborators.settings_store.load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                Settings::default()
            }
        };
        settings.sanitize();

        Self {
            settings,
            state: LifecycleState::Stopped,
            cache_server: None,
            reverse_proxy: None,
            settings_store: collaborators.settings_store,
            certificate: collaborators.certificate,
            hosts: collaborators.hosts,
            supervisor: collaborators.supervisor,
            cache: collaborators.cache,
            probe: collaborators.probe,
            generator,
            domains,
            overrides_pending: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns `(cache server pid, reverse proxy pid)` for held handles.
    pub fn process_ids(&self) -> (Option<u32>, Option<u32>) {
        (
            self.cache_server.as_ref().and_then(ProcessHandle::pid),
            self.reverse_proxy.as_ref().and_then(ProcessHandle::pid),
        )
    }

    pub fn set_proxy_url(&mut self, url: &str) -> Result<(), SettingsError> {
        self.settings.set_proxy_url(url)
    }

    pub fn set_server(&mut self, server: &str) -> Result<(), SettingsError> {
        self.settings.set_server(server)
    }

    pub fn set_cache_size(&mut self, bytes: u64) -> Result<(), SettingsError> {
        self.settings.set_cache_size(bytes)
    }

    /// Restarts everything with the current settings.
    pub async fn run(&mut self) -> Report {
        info!("Running (was {})", self.state);
        let report = self.execute(Operation::Run, RUN_SEQUENCE).await;

        // Set regardless of the start outcome
        self.state = LifecycleState::Running;

        if report.is_success() {
            info!("Tile cache running");
        } else {
            warn!(
                "Tile cache running with {} failed step(s)",
                report.failures().count()
            );
        }
        report
    }

    /// Stops both processes. Does nothing when no handles are held.
    pub async fn stop(&mut self) -> Report {
        let report = self.execute(Operation::Stop, STOP_SEQUENCE).await;
        self.state = LifecycleState::Stopped;
        info!("Tile cache stopped");
        report
    }

    /// Saves settings, stops both processes, and restores the hosts file.
    pub async fn quit(mut self) -> Report {
        let report = self.execute(Operation::Quit, QUIT_SEQUENCE).await;
        self.state = LifecycleState::Stopped;
        // Restore was attempted; the drop guard must not repeat it
        self.overrides_pending = false;
        info!("Shut down");
        report
    }

    /// Probes `server`, through `proxy` when given.
    ///
    /// Returns within [`CONNECTIVITY_TIMEOUT`].
    pub async fn test_connectivity(
        &self,
        server: &str,
        proxy: Option<&str>,
    ) -> Result<Duration, LifecycleError> {
        match tokio::time::timeout(CONNECTIVITY_TIMEOUT, self.probe.probe(server, proxy)).await {
            Ok(Ok(elapsed)) => {
                info!("{} reachable in {:.3}s", server, elapsed.as_secs_f64());
                Ok(elapsed)
            }
            Ok(Err(e)) => {
                warn!("Connectivity test against {} failed: {}", server, e);
                Err(LifecycleError::Connectivity(e.to_string()))
            }
            Err(_) => {
                warn!("Connectivity test against {} timed out", server);
                Err(LifecycleError::Connectivity(format!(
                    "no response from {} within {:?}",
                    server, CONNECTIVITY_TIMEOUT
                )))
            }
        }
    }

    /// Probes the selected server through the configured proxy.
    pub async fn test_selected(&self) -> Result<Duration, LifecycleError> {
        self.test_connectivity(&self.settings.selected_server, self.settings.proxy())
            .await
    }

    /// Clears the tile cache. The lifecycle state is untouched.
    pub fn clear_cache(&self) -> Result<(), LifecycleError> {
        self.cache.clear().map_err(|e| {
            warn!("Cache clear failed: {}", e);
            LifecycleError::CacheClear(e.to_string())
        })?;
        info!("Cache cleared");
        Ok(())
    }

    async fn execute(&mut self, operation: Operation, steps: &[Step]) -> Report {
        let mut report = Report::new(operation);
        for &step in steps {
            let result = self.perform(step).await;
            report.record(step, result);
        }
        report
    }

    async fn perform(&mut self, step: Step) -> Result<(), LifecycleError> {
        match step {
            Step::SaveSettings => self
                .settings_store
                .save(&self.settings)
                .map_err(|e| LifecycleError::Persistence(e.to_string())),

            Step::StopCacheServer => match self.cache_server.take() {
                Some(handle) => self
                    .supervisor
                    .stop_cache_server(handle)
                    .await
                    .map_err(|e| LifecycleError::Shutdown(format!("cache server: {}", e))),
                None => Ok(()),
            },

            Step::StopReverseProxy => match self.reverse_proxy.take() {
                Some(handle) => self
                    .supervisor
                    .stop_reverse_proxy(handle)
                    .await
                    .map_err(|e| LifecycleError::Shutdown(format!("reverse proxy: {}", e))),
                None => Ok(()),
            },

            Step::InstallCertificate => self
                .certificate
                .install()
                .map_err(|e| LifecycleError::Certificate(e.to_string())),

            Step::GenerateConfig => self.generate_config(),

            Step::OverrideHosts => {
                // A failed apply may still have written part of the file
                self.overrides_pending = true;
                self.hosts
                    .apply(&self.domains)
                    .map_err(|e| LifecycleError::HostsOverride(e.to_string()))
            }

            Step::StartProcesses => self.start_processes().await,

            Step::RestoreHosts => {
                self.hosts
                    .restore()
                    .map_err(|e| LifecycleError::HostsOverride(e.to_string()))?;
                self.overrides_pending = false;
                Ok(())
            }
        }
    }

    fn generate_config(&mut self) -> Result<(), LifecycleError> {
        let original_ips = self
            .hosts
            .original_ips(&self.domains)
            .map_err(|e| LifecycleError::ConfigGeneration(e.to_string()))?;

        for domain in &self.domains {
            if !original_ips.contains_key(domain) {
                warn!("No original address for {}, its token is left in place", domain);
            }
        }

        self.generator
            .generate(&original_ips)
            .map_err(|e| LifecycleError::ConfigGeneration(e.to_string()))
    }

    async fn start_processes(&mut self) -> Result<(), LifecycleError> {
        let launch = CacheServerLaunch::from(&self.settings);
        let mut failures = Vec::new();

        match self.supervisor.start_cache_server(&launch).await {
            Ok(handle) => self.cache_server = Some(handle),
            Err(e) => failures.push(format!("cache server: {}", e)),
        }

        match self.supervisor.start_reverse_proxy().await {
            Ok(handle) => self.reverse_proxy = Some(handle),
            Err(e) => failures.push(format!("reverse proxy: {}", e)),
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::Startup(failures.join("; ")))
        }
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        if !self.overrides_pending {
            return;
        }

        warn!("Controller dropped without quit, restoring hosts overrides");
        if let Err(e) = self.hosts.restore() {
            error!("Failed to restore hosts overrides: {}", e);
        }
    }
}
