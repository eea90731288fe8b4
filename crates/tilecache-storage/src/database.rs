//! High-level database interface.

use std::path::PathBuf;

use directories::ProjectDirs;
use tilecache_core::{Settings, SettingsStore, SystemError};
use tracing::info;

use crate::error::{Result, StorageError};
use crate::pool::ConnectionPool;
use crate::repository::SettingsRepo;

/// Settings database for Tilecache.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Opens the database at a specific path.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening database at: {:?}", path);
        let pool = ConnectionPool::new(&path)?;

        Ok(Self { pool })
    }

    /// Creates an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let pool = ConnectionPool::in_memory()?;
        Ok(Self { pool })
    }

    /// Returns the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "tilecache", "tilecache")
            .ok_or_else(|| StorageError::Config("Could not determine app data directory".into()))?;

        Ok(proj_dirs.data_dir().join("tilecache.db"))
    }

    /// Loads user settings.
    pub fn load_settings(&self) -> Result<Settings> {
        let conn = self.pool.get()?;
        SettingsRepo::load(&conn)
    }

    /// Saves user settings.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let conn = self.pool.get()?;
        SettingsRepo::save(&conn, settings)
    }
}

impl SettingsStore for Database {
    fn load(&self) -> std::result::Result<Settings, SystemError> {
        Ok(self.load_settings()?)
    }

    fn save(&self, settings: &Settings) -> std::result::Result<(), SystemError> {
        self.save_settings(settings)?;
        tracing::debug!("Settings saved");
        Ok(())
    }
}
