//! Hosts file overrides.
//!
//! Overrides live in a marked section so they can be removed without
//! touching anything else in the file:
//!
//! ```text
//! # BEGIN tilecache
//! 127.0.0.1 kh.ssl.ak.tiles.virtualearth.net # origin 23.61.2.17
//! # END tilecache
//! ```
//!
//! The `# origin` tag records the address the domain resolved to before the
//! override, which is otherwise unrecoverable once the override is active.

use std::fmt::Write;
use std::fs;
use std::io;
use std::net::{IpAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use tilecache_core::{HostsOverride, OriginalIps, SystemError};
use tracing::{debug, info, warn};

const BEGIN_MARKER: &str = "# BEGIN tilecache";
const END_MARKER: &str = "# END tilecache";
const ORIGIN_TAG: &str = "# origin ";
const OVERRIDE_ADDR: &str = "127.0.0.1";

/// Resolves a domain to a single address.
pub type Resolver = Box<dyn Fn(&str) -> Option<IpAddr> + Send>;

/// Returns the platform hosts file path.
pub fn default_hosts_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\Windows\System32\drivers\etc\hosts")
    } else {
        PathBuf::from("/etc/hosts")
    }
}

/// Resolves `domain` through the system resolver, skipping loopback results.
///
/// IPv4 is preferred since the rendered nginx config expects it.
pub fn system_resolve(domain: &str) -> Option<IpAddr> {
    let addrs: Vec<IpAddr> = (domain, 443)
        .to_socket_addrs()
        .ok()?
        .map(|a| a.ip())
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
        .collect();

    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

/// Hosts file managed by Tilecache.
pub struct HostsFile {
    path: PathBuf,
    resolver: Resolver,
    /// Addresses seen this session.
    origins: OriginalIps,
}

impl std::fmt::Debug for HostsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostsFile")
            .field("path", &self.path)
            .field("origins", &self.origins)
            .finish()
    }
}

impl Default for HostsFile {
    fn default() -> Self {
        Self::new(default_hosts_path())
    }
}

impl HostsFile {
    /// Creates a manager for the hosts file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            resolver: Box::new(system_resolve),
            origins: OriginalIps::new(),
        }
    }

    /// Replaces the resolver.
    pub fn with_resolver(mut self, resolver: impl Fn(&str) -> Option<IpAddr> + Send + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Returns the hosts file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> io::Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    fn write(&self, content: &str) -> io::Result<()> {
        fs::write(&self.path, content)?;
        flush_dns_cache();
        Ok(())
    }
}

impl HostsOverride for HostsFile {
    fn apply(&mut self, domains: &[String]) -> Result<(), SystemError> {
        let origins = self.original_ips(domains)?;
        let current = self.read()?;

        let updated = update_content(&current, domains, &origins);
        self.write(&updated)?;

        info!(
            "Hosts overrides applied for {} domain(s) in {:?}",
            domains.len(),
            self.path
        );
        Ok(())
    }

    fn restore(&mut self) -> Result<(), SystemError> {
        let current = self.read()?;
        self.origins.clear();

        if !current.contains(BEGIN_MARKER) {
            debug!("No hosts overrides to restore");
            return Ok(());
        }

        self.write(&strip_section(&current))?;
        info!("Hosts overrides removed from {:?}", self.path);
        Ok(())
    }

    fn original_ips(&mut self, domains: &[String]) -> Result<OriginalIps, SystemError> {
        let content = self.read()?;
        let recorded = recorded_origins(&content);
        let overridden = overridden_domains(&content);

        let mut result = OriginalIps::new();
        for domain in domains {
            let ip = if let Some(ip) = self.origins.get(domain) {
                Some(ip.clone())
            } else if let Some(ip) = recorded.get(domain) {
                Some(ip.clone())
            } else if overridden.contains(domain) {
                // Resolving now would only return our own override
                warn!("No recorded origin for overridden domain {}", domain);
                None
            } else {
                (self.resolver)(domain.as_str()).map(|ip| ip.to_string())
            };

            match ip {
                Some(ip) => {
                    self.origins.insert(domain.clone(), ip.clone());
                    result.insert(domain.clone(), ip);
                }
                None => warn!("Could not determine original address of {}", domain),
            }
        }

        Ok(result)
    }
}

/// Returns `content` with the Tilecache section replaced by overrides for
/// `domains`.
fn update_content(content: &str, domains: &[String], origins: &OriginalIps) -> String {
    let mut section = String::new();
    section.push_str(BEGIN_MARKER);
    section.push('\n');
    for domain in domains {
        match origins.get(domain) {
            Some(ip) => {
                let _ = writeln!(section, "{OVERRIDE_ADDR} {domain} {ORIGIN_TAG}{ip}");
            }
            None => {
                let _ = writeln!(section, "{OVERRIDE_ADDR} {domain}");
            }
        }
    }
    section.push_str(END_MARKER);
    section.push('\n');

    let mut output = strip_section(content);
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(&section);
    output
}

/// Removes the Tilecache section (and its trailing newline) from `content`.
fn strip_section(content: &str) -> String {
    let Some(start) = content.find(BEGIN_MARKER) else {
        return content.to_string();
    };
    let Some(end_offset) = content[start..].find(END_MARKER) else {
        return content.to_string();
    };

    let mut end = start + end_offset + END_MARKER.len();
    if content[end..].starts_with("\r\n") {
        end += 2;
    } else if content[end..].starts_with('\n') {
        end += 1;
    }

    let mut output = String::from(&content[..start]);
    output.push_str(&content[end..]);
    output
}

fn section_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .skip_while(|line| line.trim() != BEGIN_MARKER)
        .skip(1)
        .take_while(|line| line.trim() != END_MARKER)
}

fn recorded_origins(content: &str) -> OriginalIps {
    section_lines(content)
        .filter_map(|line| {
            let (entry, origin) = line.split_once(ORIGIN_TAG)?;
            let domain = entry.split_whitespace().nth(1)?;
            let ip = origin.trim();
            ip.parse::<IpAddr>()
                .ok()
                .map(|_| (domain.to_string(), ip.to_string()))
        })
        .collect()
}

fn overridden_domains(content: &str) -> Vec<String> {
    section_lines(content)
        .filter_map(|line| line.split_whitespace().nth(1).map(str::to_string))
        .collect()
}

#[cfg(target_os = "windows")]
fn flush_dns_cache() {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;

    if let Err(e) = std::process::Command::new("ipconfig")
        .arg("/flushdns")
        .creation_flags(CREATE_NO_WINDOW)
        .output()
    {
        warn!("Failed to flush DNS cache: {}", e);
    }
}

#[cfg(not(target_os = "windows"))]
fn flush_dns_cache() {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn domains() -> Vec<String> {
        vec!["a.example".to_string(), "b.example".to_string()]
    }

    fn fixed_resolver(domain: &str) -> Option<IpAddr> {
        match domain {
            "a.example" => "203.0.113.1".parse().ok(),
            "b.example" => "203.0.113.2".parse().ok(),
            _ => None,
        }
    }

    fn hosts_with(content: &str) -> (TempDir, HostsFile) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, content).unwrap();
        let hosts = HostsFile::new(&path).with_resolver(fixed_resolver);
        (dir, hosts)
    }

    #[test]
    fn apply_appends_section_with_origins() {
        let (_dir, mut hosts) = hosts_with("127.0.0.1 localhost\n");
        hosts.apply(&domains()).unwrap();

        let content = fs::read_to_string(hosts.path()).unwrap();
        assert!(content.starts_with("127.0.0.1 localhost\n"));
        assert!(content.contains("127.0.0.1 a.example # origin 203.0.113.1"));
        assert!(content.contains("127.0.0.1 b.example # origin 203.0.113.2"));
        assert_eq!(content.matches(BEGIN_MARKER).count(), 1);
    }

    #[test]
    fn restore_returns_original_content() {
        let original = "127.0.0.1 localhost\n::1 localhost\n";
        let (_dir, mut hosts) = hosts_with(original);

        hosts.apply(&domains()).unwrap();
        hosts.restore().unwrap();

        assert_eq!(fs::read_to_string(hosts.path()).unwrap(), original);
    }

    #[test]
    fn apply_twice_keeps_one_section() {
        let (_dir, mut hosts) = hosts_with("127.0.0.1 localhost\n");
        hosts.apply(&domains()).unwrap();
        hosts.apply(&domains()).unwrap();

        let content = fs::read_to_string(hosts.path()).unwrap();
        assert_eq!(content.matches(BEGIN_MARKER).count(), 1);
        assert_eq!(content.matches("a.example").count(), 1);
    }

    #[test]
    fn restore_without_section_leaves_file_alone() {
        let original = "10.0.0.5 nas.lan";
        let (_dir, mut hosts) = hosts_with(original);

        hosts.restore().unwrap();
        assert_eq!(fs::read_to_string(hosts.path()).unwrap(), original);
    }

    #[test]
    fn origins_come_from_recorded_section() {
        let content = "127.0.0.1 localhost\n# BEGIN tilecache\n127.0.0.1 a.example # origin 198.51.100.7\n# END tilecache\n";
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, content).unwrap();

        // A resolver that would only see the override
        let mut hosts = HostsFile::new(&path).with_resolver(|_| None);
        let origins = hosts.original_ips(&["a.example".to_string()]).unwrap();

        assert_eq!(origins.get("a.example").map(String::as_str), Some("198.51.100.7"));
    }

    #[test]
    fn overridden_domain_without_record_is_unmapped() {
        let content = "# BEGIN tilecache\n127.0.0.1 a.example\n# END tilecache\n";
        let (_dir, mut hosts) = hosts_with(content);

        let origins = hosts.original_ips(&domains()).unwrap();
        assert!(!origins.contains_key("a.example"));
        assert_eq!(origins.get("b.example").map(String::as_str), Some("203.0.113.2"));
    }

    #[test]
    fn unresolvable_domain_is_skipped() {
        let (_dir, mut hosts) = hosts_with("");
        let origins = hosts
            .original_ips(&["unknown.example".to_string()])
            .unwrap();
        assert!(origins.is_empty());
    }

    #[test]
    fn missing_hosts_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let mut hosts = HostsFile::new(dir.path().join("hosts")).with_resolver(fixed_resolver);

        hosts.restore().unwrap();
        hosts.apply(&domains()).unwrap();
        assert!(hosts.path().exists());
    }

    #[test]
    fn strip_section_handles_crlf() {
        let content = "a\r\n# BEGIN tilecache\r\n127.0.0.1 x\r\n# END tilecache\r\nb\r\n";
        assert_eq!(strip_section(content), "a\r\nb\r\n");
    }

    #[test]
    fn system_resolve_skips_loopback() {
        assert!(system_resolve("localhost").is_none());
    }
}
