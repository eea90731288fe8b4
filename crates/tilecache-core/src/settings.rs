//! User settings and their validation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream map servers the user can choose from.
pub const UPSTREAM_SERVERS: &[&str] = &[
    "mt0.google.com",
    "mt1.google.com",
    "mt2.google.com",
    "mt3.google.com",
    "khm.google.com",
];

/// Server selected when nothing (or something unknown) is stored.
pub const DEFAULT_SERVER: &str = "mt1.google.com";

/// Default cache size (2 GiB).
pub const DEFAULT_CACHE_SIZE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

static PROXY_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?|socks5h?)://(?:[A-Za-z0-9.\-]+|\[[0-9A-Fa-f:.]+\]):([0-9]{1,5})$")
        .expect("Invalid proxy URL pattern")
});

/// Errors raised when a setting edit is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// Proxy URL is not `scheme://host:port`.
    #[error("invalid proxy URL '{0}', expected http://ip:port or socks5h://ip:port")]
    InvalidProxyUrl(String),

    /// Server is not one of [`UPSTREAM_SERVERS`].
    #[error("unknown server '{0}'")]
    UnknownServer(String),

    /// Cache size must be positive.
    #[error("cache size must be greater than zero")]
    InvalidCacheSize,
}

/// Checks that `url` is empty or has the form `scheme://host:port`, with
/// a port in `1..=65535`.
pub fn validate_proxy_url(url: &str) -> Result<(), SettingsError> {
    if url.is_empty() {
        return Ok(());
    }

    let port = PROXY_URL_RE
        .captures(url)
        .and_then(|caps| caps[1].parse::<u16>().ok());
    match port {
        Some(port) if port > 0 => Ok(()),
        _ => Err(SettingsError::InvalidProxyUrl(url.to_string())),
    }
}

/// User configuration persisted between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Proxy used to reach the upstream server; empty means none.
    pub proxy_url: String,
    /// One of [`UPSTREAM_SERVERS`].
    pub selected_server: String,
    /// Size budget handed to the cache server.
    pub cache_size_bytes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy_url: String::new(),
            selected_server: DEFAULT_SERVER.to_string(),
            cache_size_bytes: DEFAULT_CACHE_SIZE_BYTES,
        }
    }
}

impl Settings {
    /// Returns the proxy URL, or `None` when no proxy is configured.
    pub fn proxy(&self) -> Option<&str> {
        if self.proxy_url.is_empty() {
            None
        } else {
            Some(&self.proxy_url)
        }
    }

    /// Sets the proxy URL after validation. Whitespace is trimmed.
    pub fn set_proxy_url(&mut self, url: &str) -> Result<(), SettingsError> {
        let url = url.trim();
        validate_proxy_url(url)?;
        self.proxy_url = url.to_string();
        Ok(())
    }

    /// Selects an upstream server from the fixed set.
    pub fn set_server(&mut self, server: &str) -> Result<(), SettingsError> {
        if !UPSTREAM_SERVERS.contains(&server) {
            return Err(SettingsError::UnknownServer(server.to_string()));
        }
        self.selected_server = server.to_string();
        Ok(())
    }

    /// Sets the cache size.
    pub fn set_cache_size(&mut self, bytes: u64) -> Result<(), SettingsError> {
        if bytes == 0 {
            return Err(SettingsError::InvalidCacheSize);
        }
        self.cache_size_bytes = bytes;
        Ok(())
    }

    /// Replaces out-of-range values with defaults.
    ///
    /// Returns `true` if anything was changed.
    pub fn sanitize(&mut self) -> bool {
        let mut changed = false;

        if !UPSTREAM_SERVERS.contains(&self.selected_server.as_str()) {
            tracing::warn!(
                "Stored server '{}' is not available, using {}",
                self.selected_server,
                DEFAULT_SERVER
            );
            self.selected_server = DEFAULT_SERVER.to_string();
            changed = true;
        }

        if self.cache_size_bytes == 0 {
            tracing::warn!(
                "Stored cache size is zero, using {} bytes",
                DEFAULT_CACHE_SIZE_BYTES
            );
            self.cache_size_bytes = DEFAULT_CACHE_SIZE_BYTES;
            changed = true;
        }

        if validate_proxy_url(&self.proxy_url).is_err() {
            tracing::warn!("Stored proxy URL '{}' is invalid, clearing it", self.proxy_url);
            self.proxy_url.clear();
            changed = true;
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let mut settings = Settings::default();
        assert!(!settings.sanitize());
        assert!(settings.proxy().is_none());
        assert!(UPSTREAM_SERVERS.contains(&settings.selected_server.as_str()));
    }

    #[test]
    fn proxy_url_formats() {
        assert!(validate_proxy_url("").is_ok());
        assert!(validate_proxy_url("http://192.168.10.1:8080").is_ok());
        assert!(validate_proxy_url("socks5h://192.168.10.10:1080").is_ok());
        assert!(validate_proxy_url("https://proxy.local:3128").is_ok());

        assert!(validate_proxy_url("192.168.10.1:8080").is_err());
        assert!(validate_proxy_url("ftp://host:21").is_err());
        assert!(validate_proxy_url("http://host").is_err());
        assert!(validate_proxy_url("http://host:80/path").is_err());
    }

    #[test]
    fn proxy_host_and_port_are_checked() {
        assert!(validate_proxy_url("http://[::1]:3128").is_ok());
        assert!(validate_proxy_url("socks5://proxy.local:65535").is_ok());

        assert!(validate_proxy_url("http://a:b:1").is_err());
        assert!(validate_proxy_url("http://h[:1").is_err());
        assert!(validate_proxy_url("http://]:1").is_err());
        assert!(validate_proxy_url("http://h:99999").is_err());
        assert!(validate_proxy_url("http://h:65536").is_err());
        assert!(validate_proxy_url("http://h:0").is_err());
    }

    #[test]
    fn rejected_proxy_keeps_previous_value() {
        let mut settings = Settings::default();
        settings.set_proxy_url("http://10.0.0.1:8080").unwrap();

        let err = settings.set_proxy_url("not a url").unwrap_err();
        assert!(matches!(err, SettingsError::InvalidProxyUrl(_)));
        assert_eq!(settings.proxy(), Some("http://10.0.0.1:8080"));
    }

    #[test]
    fn set_proxy_trims_and_clears() {
        let mut settings = Settings::default();
        settings.set_proxy_url("  http://10.0.0.1:8080 ").unwrap();
        assert_eq!(settings.proxy_url, "http://10.0.0.1:8080");

        settings.set_proxy_url("").unwrap();
        assert!(settings.proxy().is_none());
    }

    #[test]
    fn server_must_be_in_set() {
        let mut settings = Settings::default();
        settings.set_server("mt3.google.com").unwrap();
        assert_eq!(settings.selected_server, "mt3.google.com");

        assert_eq!(
            settings.set_server("example.com"),
            Err(SettingsError::UnknownServer("example.com".into()))
        );
        assert_eq!(settings.selected_server, "mt3.google.com");
    }

    #[test]
    fn zero_cache_size_rejected() {
        let mut settings = Settings::default();
        assert_eq!(settings.set_cache_size(0), Err(SettingsError::InvalidCacheSize));
        settings.set_cache_size(1024).unwrap();
        assert_eq!(settings.cache_size_bytes, 1024);
    }

    #[test]
    fn sanitize_replaces_unknown_values() {
        let mut settings = Settings {
            proxy_url: "garbage".into(),
            selected_server: "retired.example.com".into(),
            cache_size_bytes: 0,
        };

        assert!(settings.sanitize());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn sanitize_resets_zero_cache_size() {
        let mut settings = Settings {
            cache_size_bytes: 0,
            ..Settings::default()
        };

        assert!(settings.sanitize());
        assert_eq!(settings.cache_size_bytes, DEFAULT_CACHE_SIZE_BYTES);
        assert!(!settings.sanitize());
    }

    #[test]
    fn serde_round_trip_uses_field_names() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["selected_server"], DEFAULT_SERVER);
        assert_eq!(json["proxy_url"], "");
    }
}
