//! Database schema and migrations.
//!
//! The applied version is kept in `PRAGMA user_version`. Each migration runs
//! in its own transaction together with the version bump.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

struct Migration {
    version: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "config table",
    sql: "CREATE TABLE IF NOT EXISTS config (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL,
              updated_at TEXT NOT NULL
          );",
}];

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Applies every migration newer than the stored version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current = schema_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        return Ok(());
    }

    info!(
        "Migrating settings database from version {} to {}",
        current, SCHEMA_VERSION
    );
    for migration in pending {
        info!("Applying migration v{}: {}", migration.version, migration.description);
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;
    }

    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
