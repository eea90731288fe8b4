//! Database repositories.

pub mod config;
pub mod settings;

pub use config::ConfigRepo;
pub use settings::SettingsRepo;
