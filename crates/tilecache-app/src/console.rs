//! Interactive console.
//!
//! Reads one command per line from stdin. End of input and Ctrl-C both quit,
//! which restores the hosts file before the process exits.

use std::future::Future;
use std::io::Write;
use std::path::Path;

use thiserror::Error;
use tilecache_core::UPSTREAM_SERVERS;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{error, info};

use crate::controller::{LifecycleController, Report};

/// Command typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Run,
    Stop,
    Status,
    /// Probe the selected server.
    Test,
    ClearCache,
    /// `None` clears the proxy.
    SetProxy(Option<String>),
    SetServer(String),
    SetCacheSize(u64),
    Servers,
    /// Open the log directory.
    Logs,
    Help,
    Quit,
}

/// Rejected console input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '{0}', type 'help' for a list")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid size '{0}', expected bytes or a K/M/G suffix")]
    InvalidSize(String),
}

const HELP: &[(&str, &str)] = &[
    ("run", "start (or restart) the tile cache"),
    ("stop", "stop the cache server and reverse proxy"),
    ("status", "show state and settings"),
    ("test", "test the connection to the selected server"),
    ("clear-cache", "delete every cached tile"),
    ("set proxy <url|none>", "proxy for upstream requests"),
    ("set server <name>", "select the upstream server"),
    ("set cache-size <size>", "cache size, e.g. 2G or 512M"),
    ("servers", "list upstream servers"),
    ("logs", "open the log directory"),
    ("help", "show this list"),
    ("quit", "stop everything and restore the hosts file"),
];

impl ConsoleCommand {
    /// Parses a line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((head, rest)) = words.split_first() else {
            return Ok(None);
        };

        let command = match (head.to_ascii_lowercase().as_str(), rest) {
            ("run" | "start", []) => Self::Run,
            ("stop", []) => Self::Stop,
            ("status", []) => Self::Status,
            ("test", []) => Self::Test,
            ("clear-cache", []) => Self::ClearCache,
            ("servers", []) => Self::Servers,
            ("logs", []) => Self::Logs,
            ("help" | "?", []) => Self::Help,
            ("quit" | "exit", []) => Self::Quit,
            ("set", [key, value]) => match key.to_ascii_lowercase().as_str() {
                "proxy" if value.eq_ignore_ascii_case("none") => Self::SetProxy(None),
                "proxy" => Self::SetProxy(Some(value.to_string())),
                "server" => Self::SetServer(value.to_string()),
                "cache-size" => Self::SetCacheSize(parse_size(value)?),
                _ => return Err(ParseError::Usage("set proxy|server|cache-size <value>")),
            },
            ("set", _) => return Err(ParseError::Usage("set proxy|server|cache-size <value>")),
            (
                "run" | "start" | "stop" | "status" | "test" | "clear-cache" | "servers"
                | "logs" | "help" | "?" | "quit" | "exit",
                _,
            ) => return Err(ParseError::Usage("command takes no arguments")),
            (other, _) => return Err(ParseError::Unknown(other.to_string())),
        };

        Ok(Some(command))
    }
}

/// Parses `2147483648`, `2G`, `512M`, `64K` (binary units).
fn parse_size(text: &str) -> Result<u64, ParseError> {
    let invalid = || ParseError::InvalidSize(text.to_string());
    let upper = text.to_ascii_uppercase();
    let upper = upper.strip_suffix('B').unwrap_or(&upper);

    let (digits, multiplier) = match upper.chars().last() {
        Some('K') => (&upper[..upper.len() - 1], 1u64 << 10),
        Some('M') => (&upper[..upper.len() - 1], 1u64 << 20),
        Some('G') => (&upper[..upper.len() - 1], 1u64 << 30),
        _ => (upper, 1),
    };

    digits
        .trim()
        .parse::<u64>()
        .map_err(|_| invalid())?
        .checked_mul(multiplier)
        .ok_or_else(invalid)
}

fn print_help() {
    println!("Commands:");
    for (usage, description) in HELP {
        println!("  {:<24} {}", usage, description);
    }
}

fn print_report(report: &Report) {
    let failures: Vec<_> = report.failures().collect();
    if failures.is_empty() {
        println!("{}: ok", report.operation());
        return;
    }
    println!("{}: finished with {} error(s)", report.operation(), failures.len());
    for failure in failures {
        println!("  {}", failure);
    }
}

fn print_status(controller: &LifecycleController) {
    let settings = controller.settings();
    let (cache_pid, proxy_pid) = controller.process_ids();
    let pid = |pid: Option<u32>| pid.map_or_else(|| "-".to_string(), |p| p.to_string());

    println!("State:        {}", controller.state());
    println!("Server:       {}", settings.selected_server);
    println!("Proxy:        {}", settings.proxy().unwrap_or("none"));
    println!("Cache size:   {} bytes", settings.cache_size_bytes);
    println!("Cache server: pid {}", pid(cache_pid));
    println!("Reverse proxy: pid {}", pid(proxy_pid));
}

async fn execute(controller: &mut LifecycleController, command: ConsoleCommand, logs_dir: &Path) {
    match command {
        ConsoleCommand::Run => print_report(&controller.run().await),
        ConsoleCommand::Stop => print_report(&controller.stop().await),
        ConsoleCommand::Status => print_status(controller),
        ConsoleCommand::Test => match controller.test_selected().await {
            Ok(elapsed) => println!("Connection ok ({:.2}s)", elapsed.as_secs_f64()),
            Err(e) => println!("{}", e),
        },
        ConsoleCommand::ClearCache => match controller.clear_cache() {
            Ok(()) => println!("Cache cleared"),
            Err(e) => println!("{}", e),
        },
        ConsoleCommand::SetProxy(url) => {
            match controller.set_proxy_url(url.as_deref().unwrap_or("")) {
                Ok(()) => println!("Proxy set; takes effect on the next run"),
                Err(e) => println!("{}", e),
            }
        }
        ConsoleCommand::SetServer(server) => match controller.set_server(&server) {
            Ok(()) => println!("Server set; takes effect on the next run"),
            Err(e) => println!("{}", e),
        },
        ConsoleCommand::SetCacheSize(bytes) => match controller.set_cache_size(bytes) {
            Ok(()) => println!("Cache size set; takes effect on the next run"),
            Err(e) => println!("{}", e),
        },
        ConsoleCommand::Servers => {
            let selected = controller.settings().selected_server.as_str();
            for server in UPSTREAM_SERVERS {
                let marker = if *server == selected { '*' } else { ' ' };
                println!(" {} {}", marker, server);
            }
        }
        ConsoleCommand::Logs => {
            if let Err(e) = open::that(logs_dir) {
                println!("Failed to open {}: {}", logs_dir.display(), e);
            }
        }
        ConsoleCommand::Help => print_help(),
        ConsoleCommand::Quit => {}
    }
}

fn prompt() {
    print!("tilecache> ");
    let _ = std::io::stdout().flush();
}

/// Runs the console until quit, end of input, or Ctrl-C, then quits the
/// controller.
pub async fn run(controller: LifecycleController, logs_dir: &Path) -> Report {
    let lines = BufReader::new(tokio::io::stdin()).lines();
    drive(controller, lines, tokio::signal::ctrl_c(), logs_dir).await
}

/// Executes commands from `lines` until quit, end of input, or `interrupt`
/// completes.
async fn drive<R, F>(
    mut controller: LifecycleController,
    mut lines: Lines<R>,
    interrupt: F,
    logs_dir: &Path,
) -> Report
where
    R: AsyncBufRead + Unpin,
    F: Future,
{
    // Polled across iterations: a Ctrl-C during a command ends the next prompt
    tokio::pin!(interrupt);
    print_help();

    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = &mut interrupt => {
                println!();
                info!("Interrupted");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };

        match ConsoleCommand::parse(&line) {
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => execute(&mut controller, command, logs_dir).await,
            Ok(None) => {}
            Err(e) => println!("{}", e),
        }
    }

    let report = controller.quit().await;
    print_report(&report);
    report
}
