//! Storage models.

use chrono::{DateTime, Utc};

/// A row of the `config` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: serde_json::Value,
    /// When the value was last written; `None` if the stored stamp is unreadable.
    pub updated_at: Option<DateTime<Utc>>,
}
