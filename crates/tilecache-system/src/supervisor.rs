//! Process supervision for the cache server and the reverse proxy.
//!
//! The cache server is owned through its [`Child`](tokio::process::Child)
//! and killed directly. The reverse proxy spawns worker processes of its
//! own, so it is stopped by image name and its launcher handle is only
//! waited on for a bounded time.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tilecache_core::{CacheServerLaunch, ProcessHandle, Supervisor, SystemError};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default wait for the reverse proxy to exit after the kill.
pub const REVERSE_PROXY_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest the kill tool may run before it is abandoned.
const KILL_TOOL_TIMEOUT: Duration = Duration::from_secs(2);

const CACHE_SERVER_LABEL: &str = "cache-server";
const REVERSE_PROXY_LABEL: &str = "reverse-proxy";

/// How to launch the cache server.
#[derive(Debug, Clone)]
pub struct CacheServerCommand {
    pub program: PathBuf,
    /// Arguments placed before the generated settings arguments.
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl CacheServerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }
}

/// How to launch and find the reverse proxy.
#[derive(Debug, Clone)]
pub struct ReverseProxyCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Image name matched when killing, e.g. `nginx.exe`.
    pub process_name: String,
}

/// Arguments describing the launch settings to the cache server.
pub fn cache_server_args(launch: &CacheServerLaunch) -> Vec<String> {
    let mut args = vec![
        "--cache-size".to_string(),
        launch.cache_size_bytes.to_string(),
        "--server".to_string(),
        launch.selected_server.clone(),
    ];
    if let Some(proxy) = &launch.proxy_url {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }
    args
}

/// Spawns and terminates the two supervised processes.
#[derive(Debug)]
pub struct ProcessSupervisor {
    cache_server: CacheServerCommand,
    reverse_proxy: ReverseProxyCommand,
    stop_timeout: Duration,
}

impl ProcessSupervisor {
    pub fn new(cache_server: CacheServerCommand, reverse_proxy: ReverseProxyCommand) -> Self {
        Self {
            cache_server,
            reverse_proxy,
            stop_timeout: REVERSE_PROXY_STOP_TIMEOUT,
        }
    }
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    async fn start_cache_server(
        &mut self,
        launch: &CacheServerLaunch,
    ) -> Result<ProcessHandle, SystemError> {
        let launcher = &self.cache_server;
        let mut cmd = Command::new(&launcher.program);
        cmd.args(&launcher.args)
            .args(cache_server_args(launch))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &launcher.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| SystemError::Spawn {
            program: launcher.program.display().to_string(),
            source,
        })?;

        info!(
            "Started cache server {:?} (pid {:?})",
            launcher.program,
            child.id()
        );
        Ok(ProcessHandle::from_child(CACHE_SERVER_LABEL, child))
    }

    async fn start_reverse_proxy(&mut self) -> Result<ProcessHandle, SystemError> {
        let launcher = &self.reverse_proxy;
        let child = Command::new(&launcher.program)
            .args(&launcher.args)
            .current_dir(&launcher.working_dir)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| SystemError::Spawn {
                program: launcher.program.display().to_string(),
                source,
            })?;

        info!(
            "Started reverse proxy {:?} in {:?} (pid {:?})",
            launcher.program,
            launcher.working_dir,
            child.id()
        );
        Ok(ProcessHandle::from_child(REVERSE_PROXY_LABEL, child))
    }

    async fn stop_cache_server(&mut self, mut handle: ProcessHandle) -> Result<(), SystemError> {
        let pid = handle.pid();
        let Some(child) = handle.child_mut() else {
            debug!("Cache server handle has no child attached");
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!("Cache server already exited with {}", status);
            return Ok(());
        }

        child.kill().await?;
        info!("Stopped {} (pid {:?})", handle.label(), pid);
        Ok(())
    }

    async fn stop_reverse_proxy(&mut self, mut handle: ProcessHandle) -> Result<(), SystemError> {
        let killed = kill_by_name(&self.reverse_proxy.process_name).await;
        if let Err(e) = &killed {
            warn!("Failed to kill {}: {}", self.reverse_proxy.process_name, e);
        }

        if let Some(child) = handle.child_mut() {
            match tokio::time::timeout(self.stop_timeout, child.wait()).await {
                Ok(Ok(status)) => debug!("Reverse proxy exited with {}", status),
                Ok(Err(e)) => warn!("Failed to wait for reverse proxy: {}", e),
                Err(_) => warn!(
                    "Reverse proxy (pid {:?}) still running after {:?}",
                    handle.pid(),
                    self.stop_timeout
                ),
            }
        }

        if killed.is_ok() {
            info!("Stopped {}", handle.label());
        }
        killed
    }
}

/// Force-kills every process whose image name is `name`.
///
/// No matching process is not an error.
async fn kill_by_name(name: &str) -> Result<(), SystemError> {
    #[cfg(target_os = "windows")]
    let (program, args, not_found) = ("taskkill", ["/F", "/IM", name], 128);
    #[cfg(not(target_os = "windows"))]
    let (program, args, not_found) = ("pkill", ["-KILL", "-x", name], 1);

    match run_kill_tool(program, &args, not_found, KILL_TOOL_TIMEOUT).await? {
        KillOutcome::Killed => {}
        KillOutcome::NoMatch => debug!("No {} process to kill", name),
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum KillOutcome {
    Killed,
    NoMatch,
}

/// Runs a kill tool, treating `not_found` as "nothing matched".
async fn run_kill_tool(
    program: &str,
    args: &[&str],
    not_found: i32,
    limit: Duration,
) -> Result<KillOutcome, SystemError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(limit, output)
        .await
        .map_err(|_| SystemError::Timeout(limit))?
        .map_err(|source| SystemError::Spawn {
            program: program.to_string(),
            source,
        })?;

    match output.status.code() {
        Some(0) => Ok(KillOutcome::Killed),
        Some(code) if code == not_found => Ok(KillOutcome::NoMatch),
        _ => Err(SystemError::command(
            program,
            format!(
                "{} ({})",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilecache_core::Settings;

    #[test]
    fn args_without_proxy() {
        let launch = CacheServerLaunch::from(&Settings::default());
        let args = cache_server_args(&launch);
        assert_eq!(
            args,
            vec!["--cache-size", "2147483648", "--server", "mt1.google.com"]
        );
    }

    #[test]
    fn args_with_proxy() {
        let launch = CacheServerLaunch {
            cache_size_bytes: 10,
            proxy_url: Some("http://10.0.0.1:8080".into()),
            selected_server: "mt0.google.com".into(),
        };
        let args = cache_server_args(&launch);
        assert_eq!(&args[4..], ["--proxy", "http://10.0.0.1:8080"]);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::time::Instant;

        fn supervisor(reverse_proxy_program: &str, reverse_proxy_args: &[&str]) -> ProcessSupervisor {
            let mut cache = CacheServerCommand::new("sh");
            // `sh -c <script> --` leaves the generated arguments as $@
            cache.args = vec!["-c".into(), "sleep 30".into(), "--".into()];

            let reverse_proxy = ReverseProxyCommand {
                program: reverse_proxy_program.into(),
                args: reverse_proxy_args.iter().map(|s| s.to_string()).collect(),
                working_dir: std::env::temp_dir(),
                process_name: "tilecache-test-absent".into(),
            };
            ProcessSupervisor::new(cache, reverse_proxy)
        }

        #[tokio::test]
        async fn cache_server_start_and_stop() {
            let mut sup = supervisor("sleep", &["5"]);
            let launch = CacheServerLaunch::from(&Settings::default());

            let handle = sup.start_cache_server(&launch).await.unwrap();
            assert_eq!(handle.label(), CACHE_SERVER_LABEL);
            assert!(handle.pid().is_some());

            sup.stop_cache_server(handle).await.unwrap();
        }

        #[tokio::test]
        async fn stop_exited_cache_server_is_ok() {
            let mut sup = supervisor("sleep", &["5"]);
            sup.cache_server.args = vec!["-c".into(), "exit 0".into(), "--".into()];
            let launch = CacheServerLaunch::from(&Settings::default());

            let mut handle = sup.start_cache_server(&launch).await.unwrap();
            if let Some(child) = handle.child_mut() {
                child.wait().await.unwrap();
            }
            sup.stop_cache_server(handle).await.unwrap();
        }

        #[tokio::test]
        async fn missing_program_is_spawn_error() {
            let mut sup = supervisor("/nonexistent/tilecache-nginx", &[]);
            let err = sup.start_reverse_proxy().await.unwrap_err();
            assert!(matches!(err, SystemError::Spawn { .. }));
        }

        #[tokio::test]
        async fn reverse_proxy_stop_wait_is_bounded() {
            // The kill matches nothing, so the child outlives the wait
            let mut sup = supervisor("sleep", &["5"]);
            sup.stop_timeout = Duration::from_millis(300);
            let handle = sup.start_reverse_proxy().await.unwrap();
            assert_eq!(handle.label(), REVERSE_PROXY_LABEL);

            let begin = Instant::now();
            let result = sup.stop_reverse_proxy(handle).await;
            let elapsed = begin.elapsed();

            assert!(elapsed >= Duration::from_millis(300));
            assert!(elapsed < Duration::from_secs(3));
            // pkill may be missing in minimal environments
            assert!(result.is_ok() || matches!(result, Err(SystemError::Spawn { .. })));
        }

        #[tokio::test]
        async fn default_stop_waits_one_second() {
            assert_eq!(REVERSE_PROXY_STOP_TIMEOUT, Duration::from_secs(1));

            let mut sup = supervisor("sleep", &["5"]);
            let handle = sup.start_reverse_proxy().await.unwrap();

            let begin = Instant::now();
            let _ = sup.stop_reverse_proxy(handle).await;
            let elapsed = begin.elapsed();

            assert!(elapsed >= Duration::from_secs(1));
            assert!(elapsed < Duration::from_secs(2));
        }

        #[tokio::test]
        async fn hung_kill_tool_times_out() {
            let limit = Duration::from_millis(200);

            let begin = Instant::now();
            let result = run_kill_tool("sleep", &["5"], 1, limit).await;

            assert!(matches!(result, Err(SystemError::Timeout(d)) if d == limit));
            assert!(begin.elapsed() < Duration::from_secs(2));
        }

        #[tokio::test]
        async fn kill_tool_exit_codes() {
            assert_eq!(
                run_kill_tool("sh", &["-c", "exit 0"], 1, KILL_TOOL_TIMEOUT).await.unwrap(),
                KillOutcome::Killed
            );
            assert_eq!(
                run_kill_tool("sh", &["-c", "exit 1"], 1, KILL_TOOL_TIMEOUT).await.unwrap(),
                KillOutcome::NoMatch
            );
            assert!(matches!(
                run_kill_tool("sh", &["-c", "exit 3"], 1, KILL_TOOL_TIMEOUT).await,
                Err(SystemError::Command { .. })
            ));
        }
    }
}
