//! Filesystem layout of an installation.

use std::env::consts::EXE_SUFFIX;
use std::path::{Path, PathBuf};

use tilecache_storage::Database;
use tilecache_system::default_hosts_path;

/// Every path the orchestrator reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Install root.
    pub home: PathBuf,
    /// Reverse-proxy config template.
    pub template: PathBuf,
    /// Reverse-proxy working directory.
    pub nginx_dir: PathBuf,
    /// Rendered reverse-proxy config.
    pub nginx_conf: PathBuf,
    /// Certificate installed into the trust store.
    pub cert: PathBuf,
    pub nginx_program: PathBuf,
    /// Image name the reverse proxy is killed by.
    pub nginx_process_name: String,
    pub cache_server: PathBuf,
    pub hosts_file: PathBuf,
    /// Holds the settings database, logs, and the tile cache.
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Derives the default layout under `home`.
    ///
    /// Relative homes are made absolute so the reverse proxy can be launched
    /// from its own working directory.
    pub fn new(home: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let home = std::path::absolute(&home).unwrap_or(home);
        let nginx_dir = home.join("nginx");
        let nginx_process_name = format!("nginx{}", EXE_SUFFIX);

        Self {
            template: home.join("assets").join("nginx.conf.template"),
            nginx_conf: nginx_dir.join("conf").join("nginx.conf"),
            cert: nginx_dir.join("conf").join("cert.crt"),
            nginx_program: nginx_dir.join(&nginx_process_name),
            nginx_process_name,
            cache_server: home.join(format!("tilecache-server{}", EXE_SUFFIX)),
            hosts_file: default_hosts_path(),
            data_dir: data_dir.into(),
            nginx_dir,
            home,
        }
    }

    /// Moves the reverse proxy to `dir`, keeping the config and certificate
    /// inside it.
    pub fn with_nginx_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.nginx_conf = dir.join("conf").join("nginx.conf");
        self.cert = dir.join("conf").join("cert.crt");
        self.nginx_program = dir.join(&self.nginx_process_name);
        self.nginx_dir = dir;
        self
    }

    /// Platform data directory, next to the default settings database.
    pub fn default_data_dir() -> Option<PathBuf> {
        Database::default_db_path()
            .ok()
            .and_then(|path| path.parent().map(Path::to_path_buf))
    }

    pub fn database(&self) -> PathBuf {
        self.data_dir.join("tilecache.db")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_home() {
        let paths = AppPaths::new("/opt/tilecache", "/var/lib/tilecache");

        assert_eq!(
            paths.template,
            Path::new("/opt/tilecache/assets/nginx.conf.template")
        );
        assert_eq!(paths.nginx_dir, Path::new("/opt/tilecache/nginx"));
        assert_eq!(
            paths.nginx_conf,
            Path::new("/opt/tilecache/nginx/conf/nginx.conf")
        );
        assert_eq!(paths.cert, Path::new("/opt/tilecache/nginx/conf/cert.crt"));
        assert!(paths.nginx_program.starts_with("/opt/tilecache/nginx"));
        assert_eq!(paths.database(), Path::new("/var/lib/tilecache/tilecache.db"));
        assert_eq!(paths.cache_dir(), Path::new("/var/lib/tilecache/cache"));
    }

    #[test]
    fn relative_home_becomes_absolute() {
        let paths = AppPaths::new(".", "data");
        assert!(paths.home.is_absolute());
        assert!(paths.nginx_dir.is_absolute());
    }

    #[test]
    fn nginx_dir_override_moves_config() {
        let paths = AppPaths::new("/opt/tilecache", "/data").with_nginx_dir("/srv/nginx");
        assert_eq!(paths.nginx_conf, Path::new("/srv/nginx/conf/nginx.conf"));
        assert_eq!(paths.cert, Path::new("/srv/nginx/conf/cert.crt"));
        assert!(paths.nginx_program.starts_with("/srv/nginx"));
        assert_eq!(paths.template, Path::new("/opt/tilecache/assets/nginx.conf.template"));
    }
}
