//! ShopList configuration
//!
//! Each concern owns a section type implementing [`ConfigSection`]:
//!
//! - `app`: logging and the participant's display name
//! - `sync`: debounce, batching and shutdown windows for the sync engine
//! - `notifications`: which activity notifications are sent and how often
//!
//! Invalid files fall back to defaults with a warning, and saves are atomic.
//!
//! # Example
//!
//! ```rust,no_run
//! use shoplist_config::{Config, ConfigManager};
//!
//! let manager = ConfigManager::new().expect("Failed to initialize config");
//! let config = manager.load_or_default();
//!
//! println!("Toggle debounce: {}ms", config.sync.mutation_debounce_ms);
//! ```

mod error;
mod manager;
mod persistence;
mod validation;

pub mod app_config;
mod notification_config;
mod sync_config;

pub use error::{ConfigError, ConfigResult, ValidationError};
pub use manager::ConfigManager;
pub use validation::{ConfigSection, Validator};

pub use app_config::{AppConfig, LogLevel};
pub use notification_config::NotificationConfig;
pub use sync_config::SyncConfig;

use serde::{Deserialize, Serialize};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Config file format version
    pub version: u32,

    /// Application-level settings
    pub app: AppConfig,

    /// Sync engine timing
    pub sync: SyncConfig,

    /// Activity notification preferences
    pub notifications: NotificationConfig,
}

impl Config {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the entire configuration
    ///
    /// Returns all validation errors found across all sections.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(mut e) = self.app.validate() {
            errors.append(&mut e);
        }

        if let Err(mut e) = self.sync.validate() {
            errors.append(&mut e);
        }

        if let Err(mut e) = self.notifications.validate() {
            errors.append(&mut e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Merges this config with another, preferring values from `other`
    pub fn merge(&mut self, other: Config) {
        self.app.merge(other.app);
        self.sync.merge(other.sync);
        self.notifications.merge(other.notifications);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            app: AppConfig::default(),
            sync: SyncConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}
