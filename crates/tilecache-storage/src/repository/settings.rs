//! Settings repository: maps [`Settings`] onto config keys.

use rusqlite::Connection;
use tilecache_core::Settings;

use crate::error::Result;
use crate::repository::ConfigRepo;

const KEY_PROXY_URL: &str = "proxy_url";
const KEY_SELECTED_SERVER: &str = "selected_server";
const KEY_CACHE_SIZE: &str = "cache_size_bytes";

/// Repository for user settings.
pub struct SettingsRepo;

impl SettingsRepo {
    /// Loads settings, filling missing keys with defaults.
    pub fn load(conn: &Connection) -> Result<Settings> {
        let defaults = Settings::default();

        let mut settings = Settings {
            proxy_url: ConfigRepo::get_or_default(conn, KEY_PROXY_URL, defaults.proxy_url)?,
            selected_server: ConfigRepo::get_or_default(
                conn,
                KEY_SELECTED_SERVER,
                defaults.selected_server,
            )?,
            cache_size_bytes: ConfigRepo::get_or_default(
                conn,
                KEY_CACHE_SIZE,
                defaults.cache_size_bytes,
            )?,
        };
        settings.sanitize();

        Ok(settings)
    }

    /// Saves all settings in one transaction.
    pub fn save(conn: &Connection, settings: &Settings) -> Result<()> {
        let tx = conn.unchecked_transaction()?;
        ConfigRepo::set(&tx, KEY_PROXY_URL, &settings.proxy_url)?;
        ConfigRepo::set(&tx, KEY_SELECTED_SERVER, &settings.selected_server)?;
        ConfigRepo::set(&tx, KEY_CACHE_SIZE, &settings.cache_size_bytes)?;
        tx.commit()?;
        Ok(())
    }
}
