//! Tilecache - local caching reverse proxy for map tiles.
//!
//! Without a subcommand this runs the interactive console, which drives the
//! lifecycle controller until quit. Subcommands run one operation and exit.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tilecache_app::{console, AppPaths, Collaborators, LifecycleController};
use tilecache_core::{intercepted_domains, ConfigGenerator, HostsOverride};
use tilecache_storage::Database;
use tilecache_system::{
    preflight, CacheDirectory, CacheServerCommand, HostsFile, HttpProbe, ProcessSupervisor,
    ReverseProxyCommand, SystemTrustStore,
};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tilecache - local caching reverse proxy for map tiles
#[derive(Parser, Debug)]
#[command(name = "tilecache", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Install root containing assets/ and nginx/
    #[arg(long, global = true, default_value = ".")]
    home: PathBuf,

    /// Reverse-proxy config template
    #[arg(long, global = true)]
    template: Option<PathBuf>,

    /// Reverse-proxy directory (program, conf/nginx.conf, conf/cert.crt)
    #[arg(long, global = true)]
    nginx_dir: Option<PathBuf>,

    /// Certificate to install into the trust store
    #[arg(long, global = true)]
    cert: Option<PathBuf>,

    /// Cache server program
    #[arg(long, global = true)]
    cache_server: Option<PathBuf>,

    /// Hosts file to override
    #[arg(long, global = true)]
    hosts_file: Option<PathBuf>,

    /// Directory for settings, logs, and cached tiles
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Skip the administrator and port checks
    #[arg(long, global = true)]
    skip_preflight: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Test the connection to an upstream server
    Test {
        /// Server to probe (default: the selected server)
        #[arg(long)]
        server: Option<String>,

        /// Proxy URL (default: the configured proxy)
        #[arg(long)]
        proxy: Option<String>,
    },

    /// Delete every cached tile
    ClearCache,

    /// Remove hosts overrides left behind by an abnormal exit
    RestoreHosts,

    /// Print the rendered reverse-proxy config
    Render,
}

fn resolve_paths(args: &Args) -> Result<AppPaths> {
    let data_dir = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => AppPaths::default_data_dir().context("Could not determine app data directory")?,
    };

    let mut paths = AppPaths::new(&args.home, data_dir);
    if let Some(dir) = &args.nginx_dir {
        paths = paths.with_nginx_dir(dir);
    }
    if let Some(template) = &args.template {
        paths.template = template.clone();
    }
    if let Some(cert) = &args.cert {
        paths.cert = cert.clone();
    }
    if let Some(program) = &args.cache_server {
        paths.cache_server = program.clone();
    }
    if let Some(hosts) = &args.hosts_file {
        paths.hosts_file = hosts.clone();
    }
    Ok(paths)
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args, log_dir: &Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tilecache={},warn", log_level)));

    if std::fs::create_dir_all(log_dir).is_ok() {
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .max_log_files(5)
            .filename_prefix("tilecache")
            .filename_suffix("log")
            .build(log_dir)
            .ok();

        if let Some(appender) = file_appender {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stdout))
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();

            tracing::info!("Logging to {:?}", log_dir);
            return Some(guard);
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

fn build_controller(paths: &AppPaths) -> Result<LifecycleController> {
    let db = Database::with_path(paths.database())
        .with_context(|| format!("Failed to open settings database {:?}", paths.database()))?;

    let supervisor = ProcessSupervisor::new(
        CacheServerCommand {
            program: paths.cache_server.clone(),
            args: vec![
                "--cache-dir".to_string(),
                paths.cache_dir().display().to_string(),
            ],
            working_dir: Some(paths.home.clone()),
        },
        ReverseProxyCommand {
            program: paths.nginx_program.clone(),
            args: Vec::new(),
            working_dir: paths.nginx_dir.clone(),
            process_name: paths.nginx_process_name.clone(),
        },
    );

    let collaborators = Collaborators {
        settings_store: Box::new(db),
        certificate: Box::new(SystemTrustStore::new(&paths.cert)),
        hosts: Box::new(HostsFile::new(&paths.hosts_file)),
        supervisor: Box::new(supervisor),
        cache: Box::new(CacheDirectory::new(paths.cache_dir())),
        probe: Box::new(HttpProbe::new()),
    };
    let generator = ConfigGenerator::new(&paths.template, &paths.nginx_conf);

    Ok(LifecycleController::new(
        collaborators,
        generator,
        intercepted_domains(),
    ))
}

async fn interactive(args: &Args, paths: &AppPaths) -> Result<()> {
    if args.skip_preflight {
        tracing::warn!("Skipping preflight checks");
    } else {
        preflight::check().context("Preflight check failed")?;
    }

    let controller = build_controller(paths)?;
    let report = console::run(controller, &paths.logs_dir()).await;

    if !report.is_success() {
        tracing::warn!("Quit finished with errors");
    }
    Ok(())
}

async fn test(paths: &AppPaths, server: Option<String>, proxy: Option<String>) -> Result<()> {
    let controller = build_controller(paths)?;
    let server = server.unwrap_or_else(|| controller.settings().selected_server.clone());
    let proxy = proxy.or_else(|| controller.settings().proxy().map(str::to_string));

    let elapsed = controller
        .test_connectivity(&server, proxy.as_deref())
        .await?;
    println!("{} reachable in {:.2}s", server, elapsed.as_secs_f64());
    Ok(())
}

fn render(paths: &AppPaths) -> Result<()> {
    let mut hosts = HostsFile::new(&paths.hosts_file);
    let original_ips = hosts
        .original_ips(&intercepted_domains())
        .context("Failed to determine original addresses")?;

    let rendered = ConfigGenerator::new(&paths.template, &paths.nginx_conf)
        .render_template(&original_ips)
        .with_context(|| format!("Failed to render {:?}", paths.template))?;
    print!("{}", rendered);
    Ok(())
}

fn restore_hosts(paths: &AppPaths) -> Result<()> {
    HostsFile::new(&paths.hosts_file)
        .restore()
        .with_context(|| format!("Failed to restore {:?}", paths.hosts_file))?;
    println!("Hosts overrides removed from {}", paths.hosts_file.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let paths = resolve_paths(&args)?;

    let _guard = init_logging(&args, &paths.logs_dir());
    tracing::info!("Tilecache v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Paths: {:?}", paths);

    match &args.command {
        None => interactive(&args, &paths).await,
        Some(Command::Test { server, proxy }) => test(&paths, server.clone(), proxy.clone()).await,
        Some(Command::ClearCache) => {
            build_controller(&paths)?.clear_cache()?;
            println!("Cache cleared");
            Ok(())
        }
        Some(Command::RestoreHosts) => restore_hosts(&paths),
        Some(Command::Render) => render(&paths),
    }
}
