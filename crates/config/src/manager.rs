//! Configuration manager - main API for config operations

use crate::persistence::ConfigPersistence;
use crate::{Config, ConfigError, ConfigResult, LogLevel};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::str::FromStr;

/// Prefix shared by all environment overrides
const ENV_PREFIX: &str = "SHOPLIST";

/// Main configuration manager
///
/// Resolves the config file location and wraps loading, saving and
/// environment overrides.
pub struct ConfigManager {
    persistence: ConfigPersistence,
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Creates a config manager using the platform config directory
    ///
    /// - Linux: `~/.config/shoplist/`
    /// - macOS: `~/Library/Application Support/shoplist/`
    /// - Windows: `%APPDATA%\shoplist\`
    pub fn new() -> ConfigResult<Self> {
        let config_dir = Self::default_config_dir()?;
        Self::with_directory(config_dir)
    }

    /// Creates a config manager with a custom config directory
    pub fn with_directory(config_dir: PathBuf) -> ConfigResult<Self> {
        let persistence = ConfigPersistence::new(config_dir.join("config.toml"));

        Ok(Self {
            persistence,
            config_dir,
        })
    }

    fn default_config_dir() -> ConfigResult<PathBuf> {
        ProjectDirs::from("", "", "shoplist")
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::PathResolutionError {
                reason: "Could not determine user config directory".to_string(),
            })
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Loads the configuration; a missing file yields defaults
    pub fn load(&self) -> ConfigResult<Config> {
        self.persistence.load()
    }

    /// Loads the configuration, falling back to defaults on any error
    pub fn load_or_default(&self) -> Config {
        match self.load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config: {}, using defaults", e);
                Config::default()
            }
        }
    }

    /// Validates and saves the configuration atomically
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        self.persistence.save(config)
    }

    /// Loads, applies `update_fn` and saves the result
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use shoplist_config::ConfigManager;
    /// # let manager = ConfigManager::new().unwrap();
    /// manager.update(|config| {
    ///     config.app.user_name = Some("Jordan".to_string());
    /// }).expect("Failed to update config");
    /// ```
    pub fn update<F>(&self, update_fn: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.load()?;
        update_fn(&mut config);
        self.save(&config)
    }

    /// Writes a default config file if none exists
    ///
    /// Returns `Ok(true)` when a file was created.
    pub fn initialize(&self) -> ConfigResult<bool> {
        if self.config_path().exists() {
            log::info!(
                "Config file already exists at {}",
                self.config_path().display()
            );
            return Ok(false);
        }

        self.save(&Config::default())?;
        log::info!("Generated default config at {}", self.config_path().display());
        Ok(true)
    }

    /// Overwrites the config file with defaults
    pub fn reset(&self) -> ConfigResult<()> {
        self.save(&Config::default())
    }

    /// Returns validation messages for the current file, empty if valid
    pub fn validate(&self) -> ConfigResult<Vec<String>> {
        let config = self.load()?;

        match config.validate() {
            Ok(()) => Ok(Vec::new()),
            Err(errors) => Ok(errors.iter().map(|e| e.to_string()).collect()),
        }
    }

    /// Loads the config and applies `SHOPLIST_SECTION_FIELD` overrides
    ///
    /// Unparsable values are ignored with a warning.
    pub fn load_with_env_overrides(&self) -> ConfigResult<Config> {
        let mut config = self.load()?;
        apply_env_overrides(&mut config);

        if let Err(errors) = config.validate() {
            log::warn!(
                "Config validation warnings after env overrides: {:?}",
                errors
            );
        }

        Ok(config)
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(v) = env_value("SYNC_MUTATION_DEBOUNCE_MS") {
        config.sync.mutation_debounce_ms = v;
    }
    if let Some(v) = env_value("SYNC_REMOTE_BATCH_WINDOW_MS") {
        config.sync.remote_batch_window_ms = v;
    }
    if let Some(v) = env_value("SYNC_DISPOSE_FLUSH_TIMEOUT_MS") {
        config.sync.dispose_flush_timeout_ms = v;
    }
    if let Some(v) = env_value("NOTIFICATIONS_ENABLED") {
        config.notifications.enabled = v;
    }
    if let Some(v) = env_value("NOTIFICATIONS_THROTTLE_WINDOW_SECS") {
        config.notifications.throttle_window_secs = v;
    }
    if let Ok(raw) = std::env::var(format!("{ENV_PREFIX}_APP_LOG_LEVEL")) {
        match LogLevel::parse(&raw) {
            Some(level) => config.app.log_level = level,
            None => log::warn!("Ignoring unknown log level override '{}'", raw),
        }
    }
    if let Ok(name) = std::env::var(format!("{ENV_PREFIX}_APP_USER_NAME")) {
        config.app.user_name = Some(name);
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let name = format!("{ENV_PREFIX}_{key}");
    let raw = std::env::var(&name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring unparsable override {}={}", name, raw);
            None
        }
    }
}
