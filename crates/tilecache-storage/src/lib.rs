//! Tilecache Storage - SQLite settings persistence.
//!
//! Settings (proxy URL, upstream server, cache size) are stored as JSON
//! values in a key-value `config` table.
//!
//! # Example
//!
//! ```no_run
//! use tilecache_storage::Database;
//!
//! let db = Database::in_memory().unwrap();
//! let mut settings = db.load_settings().unwrap();
//! settings.set_server("mt2.google.com").unwrap();
//! db.save_settings(&settings).unwrap();
//! ```

mod database;
pub mod error;
pub mod models;
mod pool;
pub mod repository;
mod schema;

pub use database::Database;
pub use error::{Result, StorageError};
pub use models::ConfigEntry;
pub use pool::ConnectionPool;
