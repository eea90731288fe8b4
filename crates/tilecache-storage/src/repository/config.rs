//! Key-value configuration repository.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::models::ConfigEntry;

/// Repository for the `config` table.
pub struct ConfigRepo;

impl ConfigRepo {
    /// Get a configuration entry.
    pub fn get(conn: &Connection, key: &str) -> Result<Option<ConfigEntry>> {
        let row = conn
            .query_row(
                "SELECT key, value, updated_at FROM config WHERE key = ?1",
                [key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((key, value, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(ConfigEntry {
            key,
            value: serde_json::from_str(&value)?,
            updated_at: DateTime::parse_from_rfc3339(&updated_at)
                .map(|t| t.with_timezone(&Utc))
                .ok(),
        }))
    }

    /// Set a configuration value (insert or update).
    pub fn set<T: Serialize>(conn: &Connection, key: &str, value: &T) -> Result<()> {
        let value_json = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value_json, now],
        )?;

        Ok(())
    }

    /// Get a typed configuration value, or `default` when missing or
    /// not decodable as `T`.
    pub fn get_or_default<T: DeserializeOwned>(
        conn: &Connection,
        key: &str,
        default: T,
    ) -> Result<T> {
        match Self::get(conn, key)? {
            Some(entry) => Ok(serde_json::from_value(entry.value).unwrap_or(default)),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;
    use serde_json::json;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_set_and_get() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "proxy_url", &"http://10.0.0.1:8080").unwrap();
        let entry = ConfigRepo::get(&conn, "proxy_url").unwrap().unwrap();

        assert_eq!(entry.key, "proxy_url");
        assert_eq!(entry.value, json!("http://10.0.0.1:8080"));
        assert!(entry.updated_at.is_some());
    }

    #[test]
    fn test_update_existing() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "key", &1).unwrap();
        ConfigRepo::set(&conn, "key", &2).unwrap();

        let value: i64 = ConfigRepo::get_or_default(&conn, "key", 0).unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn test_get_or_default_on_type_mismatch() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "cache_size_bytes", &"not a number").unwrap();
        let value: u64 = ConfigRepo::get_or_default(&conn, "cache_size_bytes", 7).unwrap();
        assert_eq!(value, 7);

        let missing: u64 = ConfigRepo::get_or_default(&conn, "missing", 9).unwrap();
        assert_eq!(missing, 9);
    }
}
